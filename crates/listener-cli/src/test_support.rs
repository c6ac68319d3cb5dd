//! Silent engine for exercising the input and render loops.

use std::sync::atomic::{ AtomicU8, AtomicUsize, Ordering };
use std::sync::mpsc::Sender;

use listener_core::{ EngineEvent, MediaLoadError, PlaybackEngine, Playlist, Track, TransportController };


/// Accepts every track and never makes a sound or raises an event.
pub struct IdleEngine {
    loads: AtomicUsize,
    volume: AtomicU8,
}


impl IdleEngine {
    pub fn new() -> Self {
        Self { loads: AtomicUsize::new( 0 ), volume: AtomicU8::new( 100 ) }
    }


    pub fn loads( &self ) -> usize {
        self.loads.load( Ordering::SeqCst )
    }
}


impl PlaybackEngine for IdleEngine {
    fn load( &self, _track: &Track ) -> Result<(), MediaLoadError> {
        self.loads.fetch_add( 1, Ordering::SeqCst );
        Ok(())
    }

    fn play( &self ) {}

    fn pause( &self ) {}

    fn stop( &self ) {}

    fn seek( &self, _position_ms: u64 ) {}

    fn volume( &self ) -> u8 {
        self.volume.load( Ordering::SeqCst )
    }

    fn set_volume( &self, volume: u8 ) {
        self.volume.store( volume, Ordering::SeqCst );
    }

    fn position_ms( &self ) -> u64 {
        0
    }

    fn duration_ms( &self ) -> u64 {
        0
    }

    fn is_playing( &self ) -> bool {
        false
    }

    fn subscribe( &self, _observer: Sender<EngineEvent> ) {}
}


/// A controller over `n` placeholder tracks.
pub fn controller( n: usize ) -> TransportController<IdleEngine> {
    let tracks = ( 0..n ).map( |i| Track::new( format!( "/music/{:02} - Song.mp3", i + 1 ) ) );
    TransportController::new( IdleEngine::new(), Playlist::new( tracks ) )
}
