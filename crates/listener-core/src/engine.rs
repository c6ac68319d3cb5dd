//! Playback engine contract
//!
//! The transport drives audio through this trait. Engines raise events on
//! their own threads and deliver them through channels registered with
//! [`PlaybackEngine::subscribe`]; events are eventually-consistent signals,
//! not acknowledgements of the command that caused them.

use std::sync::mpsc::Sender;

use thiserror::Error;

use crate::playlist::Track;


/// Errors raised when a track cannot be opened for playback.
#[derive( Debug, Error )]
pub enum MediaLoadError {
    #[error( "Failed to open file: {0}" )]
    Open( String ),

    #[error( "Unsupported format: {0}" )]
    UnsupportedFormat( String ),

    #[error( "No audio tracks found" )]
    NoAudioTrack,

    #[error( "Audio output error: {0}" )]
    Output( String ),
}


/// Errors raised while bringing up the engine itself.
#[derive( Debug, Error )]
pub enum EngineError {
    #[error( "No output device available" )]
    NoDevice,

    #[error( "Failed to query output device: {0}" )]
    Config( String ),
}


/// Asynchronous notifications from the engine.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum EngineEvent {
    Started,
    Paused,
    Stopped,
    EndReached,
}


/// Audio decode/output engine as seen by the transport.
pub trait PlaybackEngine: Send + Sync + 'static {
    /// Opens `track`, replacing whatever was loaded. Playback does not
    /// begin until [`play`](Self::play).
    fn load( &self, track: &Track ) -> Result<(), MediaLoadError>;

    /// Starts or resumes the loaded track.
    fn play( &self );

    /// Pauses the loaded track.
    fn pause( &self );

    /// Stops and unloads the current track.
    fn stop( &self );

    /// Moves the play position of the loaded track.
    fn seek( &self, position_ms: u64 );

    fn volume( &self ) -> u8;

    /// Sets output volume in percent (0-100).
    fn set_volume( &self, volume: u8 );

    /// Current play position, or 0 when unknown.
    fn position_ms( &self ) -> u64;

    /// Length of the loaded track, or 0 when unknown.
    fn duration_ms( &self ) -> u64;

    fn is_playing( &self ) -> bool;

    /// Registers an observer for engine events.
    fn subscribe( &self, observer: Sender<EngineEvent> );
}
