//! Audio output via cpal
//!
//! Handles sending decoded PCM samples to the system audio device.

use std::collections::VecDeque;
use std::sync::atomic::{ AtomicBool, AtomicU32, Ordering };
use std::sync::{ Arc, Mutex, PoisonError };

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use thiserror::Error;


/// Errors that can occur with audio output.
#[derive( Debug, Error )]
pub enum OutputError {
    #[error( "No output device available" )]
    NoDevice,

    #[error( "Failed to get default stream config: {0}" )]
    StreamConfig( String ),

    #[error( "Failed to build output stream: {0}" )]
    BuildStream( String ),

    #[error( "Failed to play stream: {0}" )]
    PlayStream( String ),
}


/// Shared sample buffer between producer (decode worker) and consumer
/// (audio callback). Converts channel layout on the way out and applies
/// volume.
pub struct SampleBuffer {
    buffer: Mutex<VecDeque<f32>>,
    capacity: usize,
    paused: AtomicBool,
    /// Linear gain stored as f32 bits
    volume: AtomicU32,
    source_channels: usize,
    output_channels: usize,
}


impl SampleBuffer {
    /// Creates a new sample buffer.
    ///
    /// @param capacity - Maximum number of interleaved samples held
    /// @param source_channels - Channel count of the decoded audio
    /// @param output_channels - Channel count the device expects
    pub fn new( capacity: usize, source_channels: u16, output_channels: u16 ) -> Self {
        Self {
            buffer: Mutex::new( VecDeque::with_capacity( capacity ) ),
            capacity,
            paused: AtomicBool::new( false ),
            volume: AtomicU32::new( 1.0_f32.to_bits() ),
            source_channels: source_channels.max( 1 ) as usize,
            output_channels: output_channels.max( 1 ) as usize,
        }
    }


    fn samples( &self ) -> std::sync::MutexGuard<'_, VecDeque<f32>> {
        // The audio callback must keep running even if a producer panicked
        self.buffer.lock().unwrap_or_else( PoisonError::into_inner )
    }


    /// Pushes samples to the buffer. Returns number of samples actually pushed.
    pub fn push( &self, samples: &[f32] ) -> usize {
        let mut buf = self.samples();
        let room = self.capacity.saturating_sub( buf.len() );
        // Whole frames only, so channels never shift
        let to_push = ( samples.len().min( room ) / self.source_channels ) * self.source_channels;
        buf.extend( samples[ ..to_push ].iter().copied() );
        to_push
    }


    /// Fills `output` with converted frames, padding with silence.
    ///
    /// Returns the number of output samples that carried audio.
    pub fn pop( &self, output: &mut [f32] ) -> usize {
        if self.paused.load( Ordering::Relaxed ) {
            output.fill( 0.0 );
            return 0;
        }

        let gain = f32::from_bits( self.volume.load( Ordering::Relaxed ) );
        let src_ch = self.source_channels;
        let out_ch = self.output_channels;
        let mut buf = self.samples();

        let frames = ( output.len() / out_ch ).min( buf.len() / src_ch );
        let mut frame = Vec::with_capacity( src_ch );

        for out_frame in output.chunks_exact_mut( out_ch ).take( frames ) {
            frame.clear();
            frame.extend( buf.drain( ..src_ch ) );
            convert_frame( &frame, out_frame );
            for sample in out_frame.iter_mut() {
                *sample *= gain;
            }
        }

        let written = frames * out_ch;
        output[ written.. ].fill( 0.0 );
        written
    }


    pub fn len( &self ) -> usize {
        self.samples().len()
    }


    pub fn is_empty( &self ) -> bool {
        self.samples().is_empty()
    }


    pub fn clear( &self ) {
        self.samples().clear();
    }


    pub fn set_paused( &self, paused: bool ) {
        self.paused.store( paused, Ordering::Relaxed );
    }


    pub fn is_paused( &self ) -> bool {
        self.paused.load( Ordering::Relaxed )
    }


    /// Sets the linear gain (0.0 = mute, 1.0 = unity).
    pub fn set_volume( &self, volume: f32 ) {
        self.volume.store( volume.to_bits(), Ordering::Relaxed );
    }


    pub fn volume( &self ) -> f32 {
        f32::from_bits( self.volume.load( Ordering::Relaxed ) )
    }
}


/// Maps one source frame onto one output frame.
///
/// Stereo to mono mixes down; every other mismatch copies matching
/// channels and repeats the last source channel into the rest.
fn convert_frame( src: &[f32], out: &mut [f32] ) {
    if src.len() == 2 && out.len() == 1 {
        out[ 0 ] = ( src[ 0 ] + src[ 1 ] ) * 0.5;
        return;
    }
    let last = src.len() - 1;
    for ( ch, sample ) in out.iter_mut().enumerate() {
        *sample = src[ ch.min( last ) ];
    }
}


/// Audio output handler.
///
/// Not Send: cpal streams must stay on the thread that created them, so the
/// engine builds one inside each decode worker.
pub struct AudioOutput {
    stream: cpal::Stream,
    sample_rate: u32,
}


impl AudioOutput {
    /// Checks that a default output device exists.
    pub fn probe() -> Result<String, OutputError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or( OutputError::NoDevice )?;
        device.name().map_err( |e| OutputError::StreamConfig( e.to_string() ) )
    }


    /// Opens the default device for the given source format.
    ///
    /// Returns the output and the buffer the caller should feed. The device
    /// may run at a different rate than the source; callers resample to
    /// [`AudioOutput::sample_rate`].
    pub fn new(
        source_sample_rate: u32,
        source_channels: u16,
    ) -> Result<( Self, Arc<SampleBuffer> ), OutputError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or( OutputError::NoDevice )?;

        tracing::debug!( "Using output device: {:?}", device.name() );

        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
            .collect();

        let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate().0 <= source_sample_rate && c.max_sample_rate().0 >= source_sample_rate
        };

        // Prefer an exact match, then the source rate with any channel count,
        // then whatever the device defaults to.
        let config = match supported
            .iter()
            .find( |c| c.channels() == source_channels && supports_rate( c ) )
            .or_else( || supported.iter().find( |c| supports_rate( c ) ) )
        {
            Some( range ) => range.clone()
                .with_sample_rate( cpal::SampleRate( source_sample_rate ) )
                .config(),
            None => device
                .default_output_config()
                .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
                .config(),
        };

        tracing::debug!(
            "Audio output config: {} Hz, {} channels",
            config.sample_rate.0,
            config.channels
        );

        // Roughly half a second of audio at the device rate
        let capacity = ( config.sample_rate.0 as usize ) * ( source_channels.max( 1 ) as usize ) / 2;
        let sample_buffer = Arc::new( SampleBuffer::new( capacity, source_channels, config.channels ) );
        let consumer = Arc::clone( &sample_buffer );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    consumer.pop( data );
                },
                |err| tracing::error!( "Audio output error: {}", err ),
                None,
            )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        Ok(( Self { stream, sample_rate: config.sample_rate.0 }, sample_buffer ))
    }


    pub fn play( &self ) -> Result<(), OutputError> {
        self.stream
            .play()
            .map_err( |e| OutputError::PlayStream( e.to_string() ) )
    }


    /// Gets the device sample rate.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_pop_pads_with_silence() {
        let buffer = SampleBuffer::new( 64, 2, 2 );
        assert_eq!( buffer.push( &[ 0.5, -0.5 ] ), 2 );

        let mut out = [ 1.0; 4 ];
        assert_eq!( buffer.pop( &mut out ), 2 );
        assert_eq!( out, [ 0.5, -0.5, 0.0, 0.0 ] );
    }


    #[test]
    fn test_mono_to_stereo_duplicates() {
        let buffer = SampleBuffer::new( 64, 1, 2 );
        buffer.push( &[ 0.25, 0.75 ] );

        let mut out = [ 0.0; 4 ];
        buffer.pop( &mut out );
        assert_eq!( out, [ 0.25, 0.25, 0.75, 0.75 ] );
    }


    #[test]
    fn test_stereo_to_mono_mixes() {
        let buffer = SampleBuffer::new( 64, 2, 1 );
        buffer.push( &[ 1.0, 0.0 ] );

        let mut out = [ 0.0; 1 ];
        buffer.pop( &mut out );
        assert_eq!( out, [ 0.5 ] );
    }


    #[test]
    fn test_volume_scales_output() {
        let buffer = SampleBuffer::new( 64, 1, 1 );
        buffer.set_volume( 0.5 );
        buffer.push( &[ 0.8 ] );

        let mut out = [ 0.0; 1 ];
        buffer.pop( &mut out );
        assert_eq!( out, [ 0.4 ] );
    }


    #[test]
    fn test_paused_outputs_silence_and_keeps_samples() {
        let buffer = SampleBuffer::new( 64, 1, 1 );
        buffer.push( &[ 0.3, 0.3 ] );
        buffer.set_paused( true );

        let mut out = [ 1.0; 2 ];
        assert_eq!( buffer.pop( &mut out ), 0 );
        assert_eq!( out, [ 0.0, 0.0 ] );
        assert_eq!( buffer.len(), 2 );
    }


    #[test]
    fn test_push_respects_capacity_in_whole_frames() {
        let buffer = SampleBuffer::new( 5, 2, 2 );
        assert_eq!( buffer.push( &[ 0.1; 8 ] ), 4 );
        assert_eq!( buffer.len(), 4 );
    }
}
