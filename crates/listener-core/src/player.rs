//! Native playback engine
//!
//! `AudioEngine` decodes with symphonia and plays through cpal. Each loaded
//! track gets a decode worker thread that owns the output stream, feeds the
//! shared sample buffer, services seek requests and reports end of track.

use std::sync::atomic::{ AtomicBool, AtomicU64, AtomicU8, Ordering };
use std::sync::mpsc::{ self, Sender, SyncSender };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };
use std::thread;
use std::time::Duration;

use rubato::{ FastFixedOut, PolynomialDegree, Resampler };

use crate::decoder::Decoder;
use crate::engine::{ EngineError, EngineEvent, MediaLoadError, PlaybackEngine };
use crate::output::{ AudioOutput, SampleBuffer };
use crate::playlist::Track;


/// Marks an empty seek slot.
const NO_SEEK: u64 = u64::MAX;

/// Output chunk size handed to the resampler, in frames.
const RESAMPLE_CHUNK: usize = 1024;


fn lock<T>( mutex: &Mutex<T> ) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else( PoisonError::into_inner )
}


/// State shared between the engine handle and its workers.
struct Shared {
    observers: Mutex<Vec<Sender<EngineEvent>>>,
    volume: AtomicU8,
}


impl Shared {
    /// Delivers an event to every live observer, dropping closed ones.
    fn emit( &self, event: EngineEvent ) {
        tracing::debug!( "Engine event: {:?}", event );
        lock( &self.observers ).retain( |tx| tx.send( event ).is_ok() );
    }


    fn gain( &self ) -> f32 {
        self.volume.load( Ordering::Relaxed ) as f32 / 100.0
    }
}


/// Control block for one decode worker.
struct WorkerControl {
    stop: AtomicBool,
    ended: AtomicBool,
    seek_to_ms: AtomicU64,
    frames_decoded: AtomicU64,
    sample_rate: u32,
}


impl WorkerControl {
    fn take_seek( &self ) -> Option<u64> {
        match self.seek_to_ms.swap( NO_SEEK, Ordering::AcqRel ) {
            NO_SEEK => None,
            ms => Some( ms ),
        }
    }


    fn seek_pending( &self ) -> bool {
        self.seek_to_ms.load( Ordering::Acquire ) != NO_SEEK
    }


    fn set_position_ms( &self, ms: u64 ) {
        let frames = ms * self.sample_rate as u64 / 1000;
        self.frames_decoded.store( frames, Ordering::Relaxed );
    }


    fn position_ms( &self ) -> u64 {
        self.frames_decoded.load( Ordering::Relaxed ) * 1000 / self.sample_rate.max( 1 ) as u64
    }
}


/// Handle to the worker playing the loaded track.
struct LoadedTrack {
    control: Arc<WorkerControl>,
    sample_buffer: Arc<SampleBuffer>,
    duration_ms: u64,
    thread: Option<thread::JoinHandle<()>>,
}


impl LoadedTrack {
    /// Signals the worker and waits for it; the output stream closes with it.
    fn shutdown( mut self ) {
        self.control.stop.store( true, Ordering::Relaxed );
        self.sample_buffer.clear();
        if let Some( thread ) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!( "Decode worker panicked" );
            }
        }
    }
}


/// symphonia + cpal implementation of [`PlaybackEngine`].
pub struct AudioEngine {
    shared: Arc<Shared>,
    loaded: Mutex<Option<LoadedTrack>>,
}


impl AudioEngine {
    /// Creates the engine, failing if no output device is available.
    pub fn new() -> Result<Self, EngineError> {
        let device = AudioOutput::probe().map_err( |e| match e {
            crate::output::OutputError::NoDevice => EngineError::NoDevice,
            other => EngineError::Config( other.to_string() ),
        })?;
        tracing::info!( "Audio engine ready on {}", device );

        Ok( Self {
            shared: Arc::new( Shared {
                observers: Mutex::new( Vec::new() ),
                volume: AtomicU8::new( 100 ),
            }),
            loaded: Mutex::new( None ),
        })
    }


    fn unload( &self ) -> bool {
        let previous = lock( &self.loaded ).take();
        match previous {
            Some( track ) => {
                track.shutdown();
                true
            }
            None => false,
        }
    }
}


impl PlaybackEngine for AudioEngine {
    fn load( &self, track: &Track ) -> Result<(), MediaLoadError> {
        self.unload();

        tracing::info!( "Loading: {:?}", track.path() );
        let decoder = Decoder::open( track.path() )?;
        let duration_ms = decoder.duration_ms().unwrap_or( 0 );

        let control = Arc::new( WorkerControl {
            stop: AtomicBool::new( false ),
            ended: AtomicBool::new( false ),
            seek_to_ms: AtomicU64::new( NO_SEEK ),
            frames_decoded: AtomicU64::new( 0 ),
            sample_rate: decoder.sample_rate(),
        });

        let ( ready_tx, ready_rx ) = mpsc::sync_channel( 1 );
        let worker_control = Arc::clone( &control );
        let shared = Arc::clone( &self.shared );
        let thread = thread::Builder::new()
            .name( "decode".into() )
            .spawn( move || DecodeWorker::start( decoder, worker_control, shared, ready_tx ) )
            .map_err( |e| MediaLoadError::Output( e.to_string() ) )?;

        let sample_buffer = match ready_rx.recv() {
            Ok( Ok( buffer ) ) => buffer,
            Ok( Err( message ) ) => {
                let _ = thread.join();
                return Err( MediaLoadError::Output( message ) );
            }
            Err( _ ) => {
                let _ = thread.join();
                return Err( MediaLoadError::Output( "decode worker exited during startup".into() ) );
            }
        };

        *lock( &self.loaded ) = Some( LoadedTrack {
            control,
            sample_buffer,
            duration_ms,
            thread: Some( thread ),
        });

        Ok(())
    }


    fn play( &self ) {
        let resumed = lock( &self.loaded )
            .as_ref()
            .filter( |t| !t.control.ended.load( Ordering::Relaxed ) )
            .map( |t| t.sample_buffer.set_paused( false ) )
            .is_some();
        if resumed {
            self.shared.emit( EngineEvent::Started );
        }
    }


    fn pause( &self ) {
        let paused = lock( &self.loaded )
            .as_ref()
            .map( |t| t.sample_buffer.set_paused( true ) )
            .is_some();
        if paused {
            self.shared.emit( EngineEvent::Paused );
        }
    }


    fn stop( &self ) {
        if self.unload() {
            tracing::info!( "Stopped" );
        }
        self.shared.emit( EngineEvent::Stopped );
    }


    fn seek( &self, position_ms: u64 ) {
        if let Some( track ) = lock( &self.loaded ).as_ref() {
            tracing::debug!( "Seek requested: {} ms", position_ms );
            track.control.set_position_ms( position_ms );
            track.control.seek_to_ms.store( position_ms, Ordering::Release );
        }
    }


    fn volume( &self ) -> u8 {
        self.shared.volume.load( Ordering::Relaxed )
    }


    fn set_volume( &self, volume: u8 ) {
        self.shared.volume.store( volume.min( 100 ), Ordering::Relaxed );
        if let Some( track ) = lock( &self.loaded ).as_ref() {
            track.sample_buffer.set_volume( self.shared.gain() );
        }
    }


    fn position_ms( &self ) -> u64 {
        lock( &self.loaded ).as_ref().map_or( 0, |t| t.control.position_ms() )
    }


    fn duration_ms( &self ) -> u64 {
        lock( &self.loaded ).as_ref().map_or( 0, |t| t.duration_ms )
    }


    fn is_playing( &self ) -> bool {
        lock( &self.loaded ).as_ref().is_some_and( |t| {
            !t.sample_buffer.is_paused() && !t.control.ended.load( Ordering::Relaxed )
        })
    }


    fn subscribe( &self, observer: Sender<EngineEvent> ) {
        lock( &self.shared.observers ).push( observer );
    }
}


impl Drop for AudioEngine {
    fn drop( &mut self ) {
        self.unload();
    }
}


/// Converts between the source rate and the device rate.
struct Resampling {
    resampler: FastFixedOut<f32>,
    pending: Vec<Vec<f32>>,
}


impl Resampling {
    fn new( from: u32, to: u32, channels: usize ) -> Result<Self, String> {
        tracing::info!( "Resampling: {} Hz → {} Hz", from, to );
        let resampler = FastFixedOut::<f32>::new(
            to as f64 / from as f64,
            2.0,
            PolynomialDegree::Cubic,
            RESAMPLE_CHUNK,
            channels,
        ).map_err( |e| format!( "Failed to create resampler: {}", e ) )?;

        Ok( Self { resampler, pending: vec![ Vec::new(); channels ] } )
    }


    /// Queues interleaved input and returns whatever full chunks came out.
    fn process( &mut self, interleaved: &[f32] ) -> Vec<f32> {
        let channels = self.pending.len();
        for frame in interleaved.chunks_exact( channels ) {
            for ( queue, sample ) in self.pending.iter_mut().zip( frame ) {
                queue.push( *sample );
            }
        }

        let mut out = Vec::new();
        while self.pending[ 0 ].len() >= self.resampler.input_frames_next() {
            let needed = self.resampler.input_frames_next();
            let chunk: Vec<&[f32]> = self.pending.iter().map( |q| &q[ ..needed ] ).collect();
            match self.resampler.process( &chunk, None ) {
                Ok( resampled ) => out.extend( interleave( &resampled ) ),
                Err( e ) => {
                    tracing::error!( "Resample error: {}", e );
                    break;
                }
            }
            for queue in self.pending.iter_mut() {
                queue.drain( ..needed );
            }
        }
        out
    }


    /// Resamples whatever is still queued at end of file.
    fn flush( &mut self ) -> Vec<f32> {
        if self.pending[ 0 ].is_empty() {
            return Vec::new();
        }
        let result = self.resampler.process_partial( Some( self.pending.as_slice() ), None );
        for queue in self.pending.iter_mut() {
            queue.clear();
        }
        match result {
            Ok( resampled ) => interleave( &resampled ),
            Err( e ) => {
                tracing::error!( "Final resample error: {}", e );
                Vec::new()
            }
        }
    }


    fn reset( &mut self ) {
        self.resampler.reset();
        for queue in self.pending.iter_mut() {
            queue.clear();
        }
    }
}


/// Converts planar samples to interleaved.
fn interleave( channels: &[Vec<f32>] ) -> Vec<f32> {
    let frames = channels.first().map_or( 0, Vec::len );
    let mut out = Vec::with_capacity( frames * channels.len() );
    for f in 0..frames {
        out.extend( channels.iter().map( |ch| ch[ f ] ) );
    }
    out
}


/// Body of a decode worker thread.
struct DecodeWorker {
    decoder: Decoder,
    control: Arc<WorkerControl>,
    shared: Arc<Shared>,
    sample_buffer: Arc<SampleBuffer>,
    resampling: Option<Resampling>,
}


impl DecodeWorker {
    /// Opens the output on this thread, reports readiness, then decodes.
    fn start(
        decoder: Decoder,
        control: Arc<WorkerControl>,
        shared: Arc<Shared>,
        ready: SyncSender<Result<Arc<SampleBuffer>, String>>,
    ) {
        let source_rate = decoder.sample_rate();
        let channels = decoder.channels();

        let opened = AudioOutput::new( source_rate, channels as u16 )
            .map_err( |e| e.to_string() )
            .and_then( |( output, buffer )| {
                let resampling = if output.sample_rate() != source_rate {
                    Some( Resampling::new( source_rate, output.sample_rate(), channels )? )
                } else {
                    None
                };
                buffer.set_paused( true );
                buffer.set_volume( shared.gain() );
                output.play().map_err( |e| e.to_string() )?;
                Ok(( output, buffer, resampling ))
            });

        let ( output, sample_buffer, resampling ) = match opened {
            Ok( parts ) => parts,
            Err( message ) => {
                let _ = ready.send( Err( message ) );
                return;
            }
        };

        if ready.send( Ok( Arc::clone( &sample_buffer ) ) ).is_err() {
            return;
        }

        let worker = Self { decoder, control, shared, sample_buffer, resampling };
        worker.run();

        // The stream stops when the output drops, on this thread
        drop( output );
        tracing::debug!( "Decode worker: exiting" );
    }


    fn run( mut self ) {
        let channels = self.decoder.channels();
        // Keep roughly 50 ms decoded ahead of the device
        let target_buffer = ( self.decoder.sample_rate() as usize * channels ) / 20;

        loop {
            if self.control.stop.load( Ordering::Relaxed ) {
                break;
            }

            if let Some( ms ) = self.control.take_seek() {
                self.apply_seek( ms );
                continue;
            }

            if self.sample_buffer.is_paused() || self.sample_buffer.len() > target_buffer {
                thread::sleep( Duration::from_millis( 5 ) );
                continue;
            }

            match self.decoder.decode_next() {
                Ok( Some( samples ) ) => {
                    self.control.frames_decoded
                        .fetch_add( ( samples.len() / channels ) as u64, Ordering::Relaxed );
                    let out = match self.resampling.as_mut() {
                        Some( r ) => r.process( &samples ),
                        None => samples,
                    };
                    self.feed( &out );
                }
                Ok( None ) => {
                    if let Some( tail ) = self.resampling.as_mut().map( Resampling::flush ) {
                        self.feed( &tail );
                    }
                    if self.drain() {
                        self.finish();
                        break;
                    }
                }
                Err( e ) => {
                    tracing::error!( "Decode error: {}", e );
                    self.finish();
                    break;
                }
            }
        }
    }


    fn apply_seek( &mut self, ms: u64 ) {
        if let Err( e ) = self.decoder.seek( ms ) {
            tracing::warn!( "Seek to {} ms failed: {}", ms, e );
        }
        self.sample_buffer.clear();
        if let Some( r ) = self.resampling.as_mut() {
            r.reset();
        }
        self.control.set_position_ms( ms );
    }


    /// Pushes all of `samples`, waiting for room; gives up on stop or seek.
    fn feed( &self, samples: &[f32] ) {
        let mut offset = 0;
        while offset < samples.len() {
            if self.control.stop.load( Ordering::Relaxed ) || self.control.seek_pending() {
                return;
            }
            let pushed = self.sample_buffer.push( &samples[ offset.. ] );
            offset += pushed;
            if pushed == 0 {
                thread::sleep( Duration::from_millis( 5 ) );
            }
        }
    }


    /// Waits for the device to play out the buffer.
    ///
    /// Returns false if interrupted by a stop or seek request.
    fn drain( &self ) -> bool {
        while !self.sample_buffer.is_empty() {
            if self.control.stop.load( Ordering::Relaxed ) || self.control.seek_pending() {
                return false;
            }
            thread::sleep( Duration::from_millis( 10 ) );
        }
        !self.control.stop.load( Ordering::Relaxed ) && !self.control.seek_pending()
    }


    fn finish( &self ) {
        tracing::info!( "Decode worker: reached end of track" );
        self.control.ended.store( true, Ordering::Relaxed );
        self.shared.emit( EngineEvent::EndReached );
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_interleave() {
        let planar = vec![ vec![ 1.0, 2.0 ], vec![ -1.0, -2.0 ] ];
        assert_eq!( interleave( &planar ), vec![ 1.0, -1.0, 2.0, -2.0 ] );
        assert!( interleave( &[] ).is_empty() );
    }


    #[test]
    fn test_worker_control_seek_slot() {
        let control = WorkerControl {
            stop: AtomicBool::new( false ),
            ended: AtomicBool::new( false ),
            seek_to_ms: AtomicU64::new( NO_SEEK ),
            frames_decoded: AtomicU64::new( 0 ),
            sample_rate: 48_000,
        };
        assert_eq!( control.take_seek(), None );

        control.seek_to_ms.store( 1500, Ordering::Release );
        control.set_position_ms( 1500 );
        assert!( control.seek_pending() );
        assert_eq!( control.position_ms(), 1500 );
        assert_eq!( control.take_seek(), Some( 1500 ) );
        assert!( !control.seek_pending() );
    }
}
