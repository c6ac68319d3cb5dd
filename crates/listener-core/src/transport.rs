//! Transport state machine
//!
//! `TransportController` owns the playlist cursor, the playback state and
//! the volume. Commands from the input side and events from the engine are
//! serialized through one writer lock; readers take a [`TransportSnapshot`]
//! under a separate lock that is only held for the copy.
//!
//! Engine events never run controller code on the engine's thread. They are
//! queued on a channel and applied by the controller's own event thread,
//! which also owns the delayed auto-advance after end of track.

use std::panic::{ self, AssertUnwindSafe };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::mpsc::{ self, Receiver, RecvTimeoutError };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak };
use std::thread::{ self, JoinHandle };
use std::time::{ Duration, Instant };

use crate::command::Command;
use crate::engine::{ EngineEvent, PlaybackEngine };
use crate::playlist::{ Playlist, Track };


/// Delay between an end-of-track event and the automatic advance.
pub const AUTO_ADVANCE_DELAY: Duration = Duration::from_millis( 200 );

/// Past this position, "previous" restarts the current track instead.
pub const RESTART_THRESHOLD_MS: u64 = 3000;

/// Seeks never land inside the last second of a track.
pub const SEEK_TAIL_GUARD_MS: u64 = 1000;

/// How often the event thread checks whether the controller is gone or
/// shutting down.
const EVENT_IDLE_POLL: Duration = Duration::from_millis( 250 );


/// Current playback state.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}


/// Consistent copy of transport state for rendering.
#[derive( Debug, Clone )]
pub struct TransportSnapshot {
    pub state: PlaybackState,
    pub current_index: Option<usize>,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub volume: u8,
    pub playlist: Arc<Playlist>,
}


impl TransportSnapshot {
    /// Gets the track under the cursor, if any.
    pub fn current_track( &self ) -> Option<&Track> {
        self.current_index.and_then( |i| self.playlist.get( i ) )
    }
}


#[derive( Debug, Clone, Copy )]
struct Status {
    state: PlaybackState,
    current_index: Option<usize>,
    volume: u8,
    /// Bumped by `stop`; an advance scheduled under an older value is dropped.
    advance_epoch: u64,
}


/// Runs `f`, logging and swallowing a panic instead of unwinding further.
fn guarded<T>( what: &str, f: impl FnOnce() -> T ) -> Option<T> {
    match panic::catch_unwind( AssertUnwindSafe( f ) ) {
        Ok( value ) => Some( value ),
        Err( _ ) => {
            tracing::error!( "Panic while handling {}; transport continues", what );
            None
        }
    }
}


/// Playlist transport over a [`PlaybackEngine`].
pub struct TransportController<E: PlaybackEngine> {
    engine: E,
    playlist: Arc<Playlist>,
    status: RwLock<Status>,
    writer: Mutex<()>,
    auto_advance_delay: Duration,
    shutting_down: AtomicBool,
    event_thread: Mutex<Option<JoinHandle<()>>>,
}


impl<E: PlaybackEngine> TransportController<E> {
    /// Creates a stopped controller with nothing selected.
    ///
    /// The controller does not see engine events until [`start`](Self::start).
    pub fn new( engine: E, playlist: Playlist ) -> Self {
        let volume = engine.volume().min( 100 );
        Self {
            engine,
            playlist: Arc::new( playlist ),
            status: RwLock::new( Status {
                state: PlaybackState::Stopped,
                current_index: None,
                volume,
                advance_epoch: 0,
            }),
            writer: Mutex::new( () ),
            auto_advance_delay: AUTO_ADVANCE_DELAY,
            shutting_down: AtomicBool::new( false ),
            event_thread: Mutex::new( None ),
        }
    }


    /// Overrides the delay before auto-advance.
    pub fn with_auto_advance_delay( mut self, delay: Duration ) -> Self {
        self.auto_advance_delay = delay;
        self
    }


    /// Subscribes to engine events and starts the event thread.
    ///
    /// The thread holds only a weak reference. It exits on
    /// [`shutdown`](Self::shutdown), or once the controller and its engine
    /// are dropped.
    pub fn start( self ) -> std::io::Result<Arc<Self>> {
        let ( tx, rx ) = mpsc::channel();
        self.engine.subscribe( tx );

        let delay = self.auto_advance_delay;
        let controller = Arc::new( self );
        let weak = Arc::downgrade( &controller );
        let handle = thread::Builder::new()
            .name( "transport-events".into() )
            .spawn( move || Self::run_event_pump( weak, rx, delay ) )?;

        *controller.event_thread.lock().unwrap_or_else( PoisonError::into_inner ) = Some( handle );
        Ok( controller )
    }


    /// Stops playback, cancels any pending auto-advance and joins the event
    /// thread.
    ///
    /// Afterwards the event thread holds no reference to the controller, so
    /// dropping the caller's last `Arc` releases the engine on the caller's
    /// thread.
    pub fn shutdown( &self ) {
        self.shutting_down.store( true, Ordering::SeqCst );
        self.stop();

        let handle = self.event_thread.lock().unwrap_or_else( PoisonError::into_inner ).take();
        if let Some( handle ) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::error!( "Transport event thread panicked" );
            }
        }
        tracing::debug!( "Transport shut down" );
    }


    /// Applies engine events and fires the deferred auto-advance.
    fn run_event_pump( controller: Weak<Self>, events: Receiver<EngineEvent>, delay: Duration ) {
        // Deadline and the epoch the advance was requested under
        let mut pending: Option<( Instant, u64 )> = None;

        loop {
            let wait = pending
                .map_or( EVENT_IDLE_POLL, |( at, _ )| at.saturating_duration_since( Instant::now() ) );
            let received = events.recv_timeout( wait );

            let Some( controller ) = controller.upgrade() else {
                break;
            };
            if controller.shutting_down.load( Ordering::SeqCst ) {
                break;
            }

            match received {
                Ok( event ) => {
                    let requested = guarded( "engine event", || controller.apply_event( event ) ).flatten();
                    // Repeated end events inside one window collapse into one advance
                    if let ( Some( epoch ), None ) = ( requested, pending ) {
                        pending = Some(( Instant::now() + delay, epoch ));
                    }
                }
                Err( RecvTimeoutError::Timeout ) => {}
                Err( RecvTimeoutError::Disconnected ) => break,
            }

            if let Some(( at, epoch )) = pending {
                if Instant::now() >= at {
                    pending = None;
                    guarded( "auto-advance", || controller.auto_advance( epoch ) );
                }
            }
        }

        tracing::debug!( "Transport event thread exiting" );
    }


    fn writer( &self ) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else( PoisonError::into_inner )
    }


    fn status( &self ) -> Status {
        *self.status.read().unwrap_or_else( PoisonError::into_inner )
    }


    fn update( &self, f: impl FnOnce( &mut Status ) ) {
        let mut status = self.status.write().unwrap_or_else( PoisonError::into_inner );
        f( &mut status );
    }


    /// Applies one engine event.
    ///
    /// Never calls into the engine. Returns true when the event asks for an
    /// auto-advance, which the caller must schedule on its own. An end of
    /// track that arrives after [`stop`](Self::stop) asks for nothing.
    pub fn handle_event( &self, event: EngineEvent ) -> bool {
        self.apply_event( event ).is_some()
    }


    /// Like `handle_event`, but returns the advance epoch the request was
    /// made under.
    fn apply_event( &self, event: EngineEvent ) -> Option<u64> {
        let _writer = self.writer();
        let state = match event {
            EngineEvent::Started => PlaybackState::Playing,
            EngineEvent::Paused => PlaybackState::Paused,
            EngineEvent::Stopped => PlaybackState::Stopped,
            EngineEvent::EndReached => {
                let status = self.status();
                return ( status.state != PlaybackState::Stopped ).then_some( status.advance_epoch );
            }
        };
        self.update( |s| s.state = state );
        tracing::debug!( "Transport state: {:?}", state );
        None
    }


    /// Runs a scheduled advance unless the transport was stopped since it
    /// was requested.
    fn auto_advance( &self, epoch: u64 ) {
        let _writer = self.writer();
        let status = self.status();
        if status.advance_epoch != epoch || status.state == PlaybackState::Stopped {
            tracing::debug!( "Dropping auto-advance requested before stop" );
            return;
        }

        tracing::info!( "Auto-advancing after end of track" );
        if let Some( index ) = self.playlist.index_after( status.current_index ) {
            self.play_locked( index );
        }
    }


    /// Loads and plays the track at `index`. Out-of-range indices are ignored.
    ///
    /// The state becomes Playing when the engine confirms with `Started`.
    pub fn play( &self, index: usize ) {
        let _writer = self.writer();
        self.play_locked( index );
    }


    /// Plays `index`, skipping forward over tracks that fail to load.
    ///
    /// At most one pass over the playlist is attempted. If nothing loads the
    /// transport stops with the cursor on `index`.
    fn play_locked( &self, index: usize ) {
        if !self.playlist.contains_index( index ) {
            return;
        }

        let len = self.playlist.len();
        for attempt in 0..len {
            let candidate = ( index + attempt ) % len;
            let Some( track ) = self.playlist.get( candidate ) else {
                continue;
            };

            match self.engine.load( track ) {
                Ok(()) => {
                    // Published only once the engine's clock belongs to this track
                    self.update( |s| s.current_index = Some( candidate ) );
                    self.engine.play();
                    tracing::info!( "Playing [{}] {}", candidate + 1, track.file_name() );
                    return;
                }
                Err( e ) => {
                    tracing::warn!( "Skipping {}: {}", track.file_name(), e );
                }
            }
        }

        tracing::error!( "No track in the playlist could be loaded" );
        self.engine.stop();
        self.update( |s| {
            s.current_index = Some( index );
            s.state = PlaybackState::Stopped;
        });
    }


    /// Starts, pauses or resumes depending on the current state.
    pub fn play_pause( &self ) {
        let _writer = self.writer();
        let status = self.status();

        match status.state {
            PlaybackState::Stopped => self.play_locked( status.current_index.unwrap_or( 0 ) ),
            PlaybackState::Playing | PlaybackState::Paused => {
                if self.engine.is_playing() {
                    self.engine.pause();
                } else {
                    self.engine.play();
                }
            }
        }
    }


    /// Plays the next track, wrapping to the first.
    pub fn next( &self ) {
        let _writer = self.writer();
        if let Some( index ) = self.playlist.index_after( self.status().current_index ) {
            self.play_locked( index );
        }
    }


    /// Restarts the current track if it is past the threshold, otherwise
    /// plays the previous track, wrapping to the last.
    pub fn previous( &self ) {
        let _writer = self.writer();
        if self.playlist.is_empty() {
            return;
        }

        if self.engine.position_ms() > RESTART_THRESHOLD_MS {
            tracing::debug!( "Restarting current track" );
            self.engine.seek( 0 );
            return;
        }

        if let Some( index ) = self.playlist.index_before( self.status().current_index ) {
            self.play_locked( index );
        }
    }


    /// Moves the play position by `offset_ms`, clamped to the track and
    /// kept out of its final second. Ignored while the duration is unknown.
    pub fn seek( &self, offset_ms: i64 ) {
        let _writer = self.writer();
        let duration = self.engine.duration_ms();
        if duration == 0 {
            return;
        }

        let latest = duration.saturating_sub( SEEK_TAIL_GUARD_MS ) as i64;
        let target = ( self.engine.position_ms() as i64 ).saturating_add( offset_ms ).clamp( 0, latest );
        self.engine.seek( target as u64 );
    }


    /// Sets the volume, clamped to 0-100.
    pub fn set_volume( &self, volume: i32 ) {
        let _writer = self.writer();
        self.set_volume_locked( volume );
    }


    /// Adjusts the stored volume by `delta`, clamped to 0-100.
    pub fn change_volume( &self, delta: i32 ) {
        let _writer = self.writer();
        let current = self.status().volume as i32;
        self.set_volume_locked( current.saturating_add( delta ) );
    }


    fn set_volume_locked( &self, volume: i32 ) {
        let volume = volume.clamp( 0, 100 ) as u8;
        self.engine.set_volume( volume );
        self.update( |s| s.volume = volume );
    }


    /// Stops the engine and forces the Stopped state without waiting for
    /// the engine to confirm. Cancels a pending auto-advance.
    pub fn stop( &self ) {
        let _writer = self.writer();
        self.engine.stop();
        self.update( |s| {
            s.state = PlaybackState::Stopped;
            s.advance_epoch = s.advance_epoch.wrapping_add( 1 );
        });
    }


    /// Executes a transport command. `Quit` is not a transport operation and
    /// is ignored here.
    pub fn execute( &self, command: Command ) {
        tracing::debug!( "Command: {:?}", command );
        match command {
            Command::PlayPause => self.play_pause(),
            Command::Next => self.next(),
            Command::Previous => self.previous(),
            Command::Seek { offset_ms } => self.seek( offset_ms ),
            Command::Volume { delta } => self.change_volume( delta ),
            Command::Quit => {}
        }
    }


    /// Takes a snapshot for rendering without waiting on the writer lock.
    ///
    /// State, cursor and volume are one consistent copy. The clock is read
    /// from the engine right after. The cursor only moves once the new track
    /// has loaded, so a new index never shows next to the previous track's
    /// clock; during a load the old index may briefly show a zero clock.
    pub fn snapshot( &self ) -> TransportSnapshot {
        let status = self.status();
        TransportSnapshot {
            state: status.state,
            current_index: status.current_index,
            position_ms: self.engine.position_ms(),
            duration_ms: self.engine.duration_ms(),
            volume: status.volume,
            playlist: Arc::clone( &self.playlist ),
        }
    }


    pub fn state( &self ) -> PlaybackState {
        self.status().state
    }


    pub fn current_index( &self ) -> Option<usize> {
        self.status().current_index
    }


    pub fn volume( &self ) -> u8 {
        self.status().volume
    }


    pub fn playlist( &self ) -> &Arc<Playlist> {
        &self.playlist
    }


    pub fn engine( &self ) -> &E {
        &self.engine
    }
}


#[cfg( test )]
pub( crate ) mod mock {
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::mpsc::Sender;
    use std::sync::Mutex;
    use std::thread::{ self, ThreadId };
    use std::time::Duration;

    use crate::engine::{ EngineEvent, MediaLoadError, PlaybackEngine };
    use crate::playlist::Track;


    #[derive( Debug, Default )]
    pub struct MockState {
        pub loaded: Option<PathBuf>,
        pub loads: Vec<PathBuf>,
        pub load_threads: Vec<ThreadId>,
        pub playing: bool,
        pub position_ms: u64,
        pub duration_ms: u64,
        pub track_duration_ms: u64,
        pub volume: u8,
        pub seeks: Vec<u64>,
        pub stops: usize,
        pub broken: HashSet<PathBuf>,
        pub load_delay: Duration,
    }


    /// Scripted engine that records calls and emits events like a real one.
    #[derive( Default )]
    pub struct MockEngine {
        pub state: Mutex<MockState>,
        observers: Mutex<Vec<Sender<EngineEvent>>>,
    }


    impl MockEngine {
        pub fn new() -> Self {
            let engine = Self::default();
            {
                let mut s = engine.state.lock().unwrap();
                s.volume = 100;
                s.track_duration_ms = 180_000;
            }
            engine
        }


        pub fn emit( &self, event: EngineEvent ) {
            for tx in self.observers.lock().unwrap().iter() {
                let _ = tx.send( event );
            }
        }


        /// Raises end-of-track from a separate thread, as a native engine does.
        pub fn finish_track( &self ) {
            let observers: Vec<_> = self.observers.lock().unwrap().clone();
            {
                let mut s = self.state.lock().unwrap();
                s.playing = false;
            }
            thread::spawn( move || {
                for tx in observers {
                    let _ = tx.send( EngineEvent::EndReached );
                }
            })
            .join()
            .unwrap();
        }


        pub fn loads( &self ) -> Vec<PathBuf> {
            self.state.lock().unwrap().loads.clone()
        }


        pub fn set_clock( &self, position_ms: u64, duration_ms: u64 ) {
            let mut s = self.state.lock().unwrap();
            s.position_ms = position_ms;
            s.duration_ms = duration_ms;
        }


        pub fn break_track( &self, path: &str ) {
            self.state.lock().unwrap().broken.insert( PathBuf::from( path ) );
        }
    }


    impl PlaybackEngine for MockEngine {
        fn load( &self, track: &Track ) -> Result<(), MediaLoadError> {
            let delay = self.state.lock().unwrap().load_delay;
            thread::sleep( delay );

            let mut s = self.state.lock().unwrap();
            s.load_threads.push( thread::current().id() );
            if s.broken.contains( track.path() ) {
                s.loaded = None;
                return Err( MediaLoadError::Open( "corrupt".into() ) );
            }
            s.loads.push( track.path().to_path_buf() );
            s.loaded = Some( track.path().to_path_buf() );
            s.playing = false;
            s.position_ms = 0;
            s.duration_ms = s.track_duration_ms;
            Ok(())
        }


        fn play( &self ) {
            let loaded = {
                let mut s = self.state.lock().unwrap();
                s.playing = s.loaded.is_some();
                s.playing
            };
            if loaded {
                self.emit( EngineEvent::Started );
            }
        }


        fn pause( &self ) {
            self.state.lock().unwrap().playing = false;
            self.emit( EngineEvent::Paused );
        }


        fn stop( &self ) {
            {
                let mut s = self.state.lock().unwrap();
                s.loaded = None;
                s.playing = false;
                s.position_ms = 0;
                s.duration_ms = 0;
                s.stops += 1;
            }
            self.emit( EngineEvent::Stopped );
        }


        fn seek( &self, position_ms: u64 ) {
            let mut s = self.state.lock().unwrap();
            s.position_ms = position_ms;
            s.seeks.push( position_ms );
        }


        fn volume( &self ) -> u8 {
            self.state.lock().unwrap().volume
        }


        fn set_volume( &self, volume: u8 ) {
            self.state.lock().unwrap().volume = volume;
        }


        fn position_ms( &self ) -> u64 {
            self.state.lock().unwrap().position_ms
        }


        fn duration_ms( &self ) -> u64 {
            self.state.lock().unwrap().duration_ms
        }


        fn is_playing( &self ) -> bool {
            self.state.lock().unwrap().playing
        }


        fn subscribe( &self, observer: Sender<EngineEvent> ) {
            self.observers.lock().unwrap().push( observer );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use super::mock::MockEngine;


    fn playlist( n: usize ) -> Playlist {
        Playlist::new( ( 0..n ).map( |i| Track::new( format!( "/music/{:02}.mp3", i ) ) ) )
    }


    fn controller( n: usize ) -> TransportController<MockEngine> {
        TransportController::new( MockEngine::new(), playlist( n ) )
    }


    fn wait_for( what: &str, mut condition: impl FnMut() -> bool ) {
        let deadline = Instant::now() + Duration::from_secs( 2 );
        while !condition() {
            assert!( Instant::now() < deadline, "timed out waiting for {}", what );
            thread::sleep( Duration::from_millis( 5 ) );
        }
    }


    #[test]
    fn test_play_sets_cursor_for_every_index() {
        let c = controller( 4 );
        for i in 0..4 {
            c.play( i );
            assert_eq!( c.current_index(), Some( i ) );
        }
        assert_eq!( c.engine().loads().len(), 4 );
    }


    #[test]
    fn test_play_out_of_range_is_ignored() {
        let c = controller( 3 );
        c.play( 1 );
        c.play( 3 );
        assert_eq!( c.current_index(), Some( 1 ) );
        assert_eq!( c.engine().loads().len(), 1 );
    }


    #[test]
    fn test_play_state_waits_for_engine_confirmation() {
        let c = controller( 2 );
        c.play( 0 );
        assert_eq!( c.state(), PlaybackState::Stopped );

        assert!( !c.handle_event( EngineEvent::Started ) );
        assert_eq!( c.state(), PlaybackState::Playing );
    }


    #[test]
    fn test_next_wraps_around() {
        let c = controller( 3 );
        c.play( 2 );
        c.next();
        assert_eq!( c.current_index(), Some( 0 ) );
    }


    #[test]
    fn test_next_without_cursor_plays_first() {
        let c = controller( 3 );
        c.next();
        assert_eq!( c.current_index(), Some( 0 ) );
    }


    #[test]
    fn test_navigation_on_empty_playlist_is_noop() {
        let c = controller( 0 );
        c.next();
        c.previous();
        c.play_pause();
        c.play( 0 );
        assert_eq!( c.current_index(), None );
        assert!( c.engine().loads().is_empty() );
    }


    #[test]
    fn test_previous_early_in_track_goes_back() {
        let c = controller( 3 );
        c.play( 1 );
        c.engine().set_clock( 500, 180_000 );
        c.previous();
        assert_eq!( c.current_index(), Some( 0 ) );
    }


    #[test]
    fn test_previous_late_in_track_restarts() {
        let c = controller( 3 );
        c.play( 1 );
        c.engine().set_clock( 3500, 180_000 );
        c.previous();
        assert_eq!( c.current_index(), Some( 1 ) );
        assert_eq!( c.engine().position_ms(), 0 );
        assert_eq!( c.engine().loads().len(), 1 );
    }


    #[test]
    fn test_previous_at_threshold_goes_back() {
        let c = controller( 3 );
        c.play( 0 );
        c.engine().set_clock( 3000, 180_000 );
        c.previous();
        assert_eq!( c.current_index(), Some( 2 ) );
    }


    #[test]
    fn test_volume_clamps() {
        let c = controller( 1 );
        c.set_volume( 98 );
        c.change_volume( 5 );
        assert_eq!( c.volume(), 100 );

        c.set_volume( 2 );
        c.change_volume( -5 );
        assert_eq!( c.volume(), 0 );
        assert_eq!( c.engine().volume(), 0 );

        c.set_volume( 250 );
        assert_eq!( c.volume(), 100 );
    }


    #[test]
    fn test_seek_keeps_out_of_final_second() {
        let c = controller( 1 );
        c.play( 0 );
        c.engine().set_clock( 8000, 15_000 );
        c.seek( 10_000 );
        assert_eq!( c.engine().position_ms(), 14_000 );
    }


    #[test]
    fn test_seek_clamps_at_start() {
        let c = controller( 1 );
        c.play( 0 );
        c.engine().set_clock( 4000, 15_000 );
        c.seek( -10_000 );
        assert_eq!( c.engine().position_ms(), 0 );
    }


    #[test]
    fn test_seek_without_duration_is_ignored() {
        let c = controller( 1 );
        c.play( 0 );
        c.engine().set_clock( 4000, 0 );
        c.seek( 10_000 );
        assert!( c.engine().state.lock().unwrap().seeks.is_empty() );
    }


    #[test]
    fn test_seek_on_very_short_track_stays_at_zero() {
        let c = controller( 1 );
        c.play( 0 );
        c.engine().set_clock( 200, 600 );
        c.seek( 10_000 );
        assert_eq!( c.engine().position_ms(), 0 );
    }


    #[test]
    fn test_play_pause_from_stopped_without_cursor_plays_first() {
        let c = controller( 3 );
        c.play_pause();
        assert_eq!( c.current_index(), Some( 0 ) );
    }


    #[test]
    fn test_play_pause_from_stopped_replays_cursor() {
        let c = controller( 3 );
        c.play( 2 );
        c.handle_event( EngineEvent::Started );
        c.stop();
        c.play_pause();
        assert_eq!( c.current_index(), Some( 2 ) );
        assert_eq!( c.engine().loads().len(), 2 );
    }


    #[test]
    fn test_play_pause_toggles_engine() {
        let c = controller( 2 );
        c.play( 0 );
        c.handle_event( EngineEvent::Started );

        c.play_pause();
        assert!( !c.engine().is_playing() );
        c.handle_event( EngineEvent::Paused );
        assert_eq!( c.state(), PlaybackState::Paused );

        c.play_pause();
        assert!( c.engine().is_playing() );
        assert_eq!( c.engine().loads().len(), 1 );
    }


    #[test]
    fn test_stop_forces_stopped() {
        let c = controller( 2 );
        c.play( 0 );
        c.handle_event( EngineEvent::Started );
        c.stop();
        assert_eq!( c.state(), PlaybackState::Stopped );
        assert_eq!( c.engine().state.lock().unwrap().stops, 1 );
    }


    #[test]
    fn test_end_reached_only_requests_advance() {
        let c = controller( 3 );
        c.play( 0 );
        c.handle_event( EngineEvent::Started );
        assert!( c.handle_event( EngineEvent::EndReached ) );
        assert_eq!( c.current_index(), Some( 0 ) );
        assert_eq!( c.engine().loads().len(), 1 );
    }


    #[test]
    fn test_end_reached_after_stop_requests_nothing() {
        let c = controller( 3 );
        c.play( 0 );
        c.handle_event( EngineEvent::Started );
        c.stop();
        assert!( !c.handle_event( EngineEvent::EndReached ) );
    }


    #[test]
    fn test_cursor_moves_only_after_load() {
        let c = Arc::new( controller( 3 ) );
        c.play( 0 );
        c.engine().set_clock( 42_000, 180_000 );
        c.engine().state.lock().unwrap().load_delay = Duration::from_millis( 300 );

        let loading = {
            let c = Arc::clone( &c );
            thread::spawn( move || c.play( 1 ) )
        };
        thread::sleep( Duration::from_millis( 100 ) );

        let snap = c.snapshot();
        assert_eq!( snap.current_index, Some( 0 ) );
        assert_eq!( snap.position_ms, 42_000 );

        loading.join().unwrap();
        let snap = c.snapshot();
        assert_eq!( snap.current_index, Some( 1 ) );
        assert_eq!( snap.position_ms, 0 );
    }


    #[test]
    fn test_broken_tracks_are_skipped() {
        let c = controller( 4 );
        c.engine().break_track( "/music/00.mp3" );
        c.engine().break_track( "/music/01.mp3" );
        c.play( 0 );
        assert_eq!( c.current_index(), Some( 2 ) );
        assert_eq!( c.engine().loads(), vec![ PathBuf::from( "/music/02.mp3" ) ] );
    }


    #[test]
    fn test_all_broken_stops_after_one_pass() {
        let c = controller( 3 );
        for i in 0..3 {
            c.engine().break_track( &format!( "/music/{:02}.mp3", i ) );
        }
        c.play( 1 );
        assert_eq!( c.state(), PlaybackState::Stopped );
        assert_eq!( c.current_index(), Some( 1 ) );
        assert_eq!( c.engine().state.lock().unwrap().load_threads.len(), 3 );
    }


    #[test]
    fn test_execute_dispatches() {
        let c = controller( 3 );
        c.execute( Command::Next );
        c.execute( Command::Next );
        assert_eq!( c.current_index(), Some( 1 ) );

        c.execute( Command::Volume { delta: -5 } );
        assert_eq!( c.volume(), 95 );

        c.execute( Command::Quit );
        assert_eq!( c.current_index(), Some( 1 ) );
    }


    #[test]
    fn test_snapshot_reflects_state() {
        let c = controller( 3 );
        c.play( 1 );
        c.handle_event( EngineEvent::Started );
        c.engine().set_clock( 1234, 60_000 );

        let snap = c.snapshot();
        assert_eq!( snap.state, PlaybackState::Playing );
        assert_eq!( snap.current_index, Some( 1 ) );
        assert_eq!( snap.position_ms, 1234 );
        assert_eq!( snap.duration_ms, 60_000 );
        assert_eq!( snap.volume, 100 );
        assert_eq!( snap.current_track().map( |t| t.file_name() ), Some( "01.mp3".to_string() ) );
    }


    #[test]
    fn test_event_thread_applies_engine_events() {
        let c = controller( 2 ).start().unwrap();
        c.play( 0 );
        wait_for( "playing", || c.state() == PlaybackState::Playing );

        c.play_pause();
        wait_for( "paused", || c.state() == PlaybackState::Paused );
    }


    #[test]
    fn test_end_reached_advances_exactly_once() {
        let c = controller( 3 )
            .with_auto_advance_delay( Duration::from_millis( 150 ) )
            .start()
            .unwrap();
        c.play( 1 );
        wait_for( "playing", || c.state() == PlaybackState::Playing );

        c.engine().finish_track();
        c.engine().finish_track();
        wait_for( "advance", || c.current_index() == Some( 2 ) );

        thread::sleep( Duration::from_millis( 400 ) );
        assert_eq!( c.current_index(), Some( 2 ) );
        assert_eq!(
            c.engine().loads(),
            vec![ PathBuf::from( "/music/01.mp3" ), PathBuf::from( "/music/02.mp3" ) ]
        );

        // The advance ran on the controller's event thread, not the caller's
        let threads = c.engine().state.lock().unwrap().load_threads.clone();
        assert_eq!( threads[ 0 ], thread::current().id() );
        assert_ne!( threads[ 1 ], thread::current().id() );
    }


    #[test]
    fn test_end_of_last_track_wraps_to_first() {
        let c = controller( 2 )
            .with_auto_advance_delay( Duration::from_millis( 10 ) )
            .start()
            .unwrap();
        c.play( 1 );
        c.engine().finish_track();
        wait_for( "wrap", || c.current_index() == Some( 0 ) );
    }


    #[test]
    fn test_stop_cancels_pending_advance() {
        let c = controller( 3 )
            .with_auto_advance_delay( Duration::from_millis( 100 ) )
            .start()
            .unwrap();
        c.play( 0 );
        wait_for( "playing", || c.state() == PlaybackState::Playing );

        c.engine().finish_track();
        thread::sleep( Duration::from_millis( 20 ) );
        c.stop();

        thread::sleep( Duration::from_millis( 400 ) );
        assert_eq!( c.state(), PlaybackState::Stopped );
        assert_eq!( c.current_index(), Some( 0 ) );
        assert_eq!( c.engine().loads(), vec![ PathBuf::from( "/music/00.mp3" ) ] );
    }


    #[test]
    fn test_play_after_stop_is_not_skipped_by_stale_advance() {
        let c = controller( 3 )
            .with_auto_advance_delay( Duration::from_millis( 150 ) )
            .start()
            .unwrap();
        c.play( 0 );
        wait_for( "playing", || c.state() == PlaybackState::Playing );

        c.engine().finish_track();
        c.stop();
        c.play( 2 );
        wait_for( "playing again", || c.state() == PlaybackState::Playing );

        thread::sleep( Duration::from_millis( 400 ) );
        assert_eq!( c.current_index(), Some( 2 ) );
        assert_eq!( c.engine().loads().len(), 2 );
    }


    #[test]
    fn test_shutdown_joins_event_thread() {
        let c = controller( 3 )
            .with_auto_advance_delay( Duration::from_millis( 100 ) )
            .start()
            .unwrap();
        c.play( 0 );
        wait_for( "playing", || c.state() == PlaybackState::Playing );
        c.engine().finish_track();

        c.shutdown();
        assert_eq!( Arc::strong_count( &c ), 1 );
        assert!( c.event_thread.lock().unwrap().is_none() );
        assert_eq!( c.state(), PlaybackState::Stopped );

        thread::sleep( Duration::from_millis( 300 ) );
        assert_eq!( c.engine().loads().len(), 1 );
        assert!( Arc::try_unwrap( c ).is_ok() );
    }


    #[test]
    fn test_shutdown_without_event_thread() {
        let c = controller( 2 );
        c.play( 0 );
        c.shutdown();
        assert_eq!( c.state(), PlaybackState::Stopped );
    }
}
