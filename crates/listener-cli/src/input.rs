//! Keyboard input.
//!
//! Polls the terminal for key presses, turns them into transport commands
//! and runs them. Quit cancels the session instead of reaching the
//! transport.

use std::io;
use std::panic::{ self, AssertUnwindSafe };
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{ self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers };
use tokio_util::sync::CancellationToken;

use listener_core::{
    command::{ SEEK_STEP_MS, VOLUME_STEP },
    Command, PlaybackEngine, TransportController,
};


/// How long one poll waits for a key before checking for cancellation.
pub const INPUT_POLL: Duration = Duration::from_millis( 20 );


/// Maps a key event to a command. Only presses count.
pub fn decode_key( key: KeyEvent ) -> Option<Command> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    match key.code {
        KeyCode::Char( 'c' ) if key.modifiers.contains( KeyModifiers::CONTROL ) => Some( Command::Quit ),
        KeyCode::Char( ' ' ) | KeyCode::Char( 'p' ) | KeyCode::Char( 'P' ) => Some( Command::PlayPause ),
        KeyCode::Char( 'n' ) | KeyCode::Char( 'N' ) => Some( Command::Next ),
        KeyCode::Char( 'b' ) | KeyCode::Char( 'B' ) => Some( Command::Previous ),
        KeyCode::Left => Some( Command::Seek { offset_ms: -SEEK_STEP_MS } ),
        KeyCode::Right => Some( Command::Seek { offset_ms: SEEK_STEP_MS } ),
        KeyCode::Up => Some( Command::Volume { delta: VOLUME_STEP } ),
        KeyCode::Down => Some( Command::Volume { delta: -VOLUME_STEP } ),
        KeyCode::Char( 'q' ) | KeyCode::Char( 'Q' ) | KeyCode::Esc => Some( Command::Quit ),
        _ => None,
    }
}


/// Waits up to `timeout` for the next terminal event.
fn terminal_event( timeout: Duration ) -> io::Result<Option<Event>> {
    if event::poll( timeout )? {
        event::read().map( Some )
    } else {
        Ok( None )
    }
}


/// Blocking input loop over the real terminal; run it on a blocking thread.
pub fn run<E: PlaybackEngine>( controller: Arc<TransportController<E>>, cancel: CancellationToken ) {
    run_with( &controller, &cancel, terminal_event );
}


/// Input loop over any event source.
///
/// `next_event` is called with [`INPUT_POLL`] and should return `None`
/// when no event arrived in that time. Returns once `cancel` fires, a quit
/// key is pressed, or the source fails. A failing command is logged and the
/// loop keeps going.
pub fn run_with<E, F>( controller: &TransportController<E>, cancel: &CancellationToken, mut next_event: F )
where
    E: PlaybackEngine,
    F: FnMut( Duration ) -> io::Result<Option<Event>>,
{
    while !cancel.is_cancelled() {
        let key = match next_event( INPUT_POLL ) {
            Ok( Some( Event::Key( key ) ) ) => key,
            Ok( _ ) => continue,
            Err( e ) => {
                tracing::error!( "Terminal input unavailable: {}", e );
                cancel.cancel();
                break;
            }
        };

        let Some( command ) = decode_key( key ) else { continue };
        tracing::debug!( "Key {:?} -> {:?}", key.code, command );

        if command == Command::Quit {
            cancel.cancel();
            break;
        }

        let result = panic::catch_unwind( AssertUnwindSafe( || controller.execute( command ) ) );
        if result.is_err() {
            tracing::error!( "Command {:?} panicked", command );
        }
    }

    tracing::debug!( "Input loop finished" );
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::thread;
    use std::time::Instant;

    use crossterm::event::KeyEventState;

    use crate::test_support::controller;


    fn press( code: KeyCode ) -> KeyEvent {
        KeyEvent::new( code, KeyModifiers::NONE )
    }


    #[test]
    fn test_transport_keys() {
        assert_eq!( decode_key( press( KeyCode::Char( ' ' ) ) ), Some( Command::PlayPause ) );
        assert_eq!( decode_key( press( KeyCode::Char( 'p' ) ) ), Some( Command::PlayPause ) );
        assert_eq!( decode_key( press( KeyCode::Char( 'N' ) ) ), Some( Command::Next ) );
        assert_eq!( decode_key( press( KeyCode::Char( 'b' ) ) ), Some( Command::Previous ) );
    }


    #[test]
    fn test_seek_and_volume_keys() {
        assert_eq!( decode_key( press( KeyCode::Left ) ), Some( Command::Seek { offset_ms: -10_000 } ) );
        assert_eq!( decode_key( press( KeyCode::Right ) ), Some( Command::Seek { offset_ms: 10_000 } ) );
        assert_eq!( decode_key( press( KeyCode::Up ) ), Some( Command::Volume { delta: 5 } ) );
        assert_eq!( decode_key( press( KeyCode::Down ) ), Some( Command::Volume { delta: -5 } ) );
    }


    #[test]
    fn test_quit_keys() {
        assert_eq!( decode_key( press( KeyCode::Char( 'q' ) ) ), Some( Command::Quit ) );
        assert_eq!( decode_key( press( KeyCode::Esc ) ), Some( Command::Quit ) );
        assert_eq!(
            decode_key( KeyEvent::new( KeyCode::Char( 'c' ), KeyModifiers::CONTROL ) ),
            Some( Command::Quit )
        );
    }


    #[test]
    fn test_unmapped_and_released_keys_are_ignored() {
        assert_eq!( decode_key( press( KeyCode::Char( 'c' ) ) ), None );
        assert_eq!( decode_key( press( KeyCode::Enter ) ), None );

        let release = KeyEvent {
            code: KeyCode::Char( 'n' ),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        };
        assert_eq!( decode_key( release ), None );
    }


    /// Replays `keys`, then reports nothing until the loop stops asking.
    fn scripted( keys: &[ KeyCode ] ) -> impl FnMut( Duration ) -> io::Result<Option<Event>> {
        let mut queue: VecDeque<Event> = keys.iter().map( |code| Event::Key( press( *code ) ) ).collect();
        move |timeout| match queue.pop_front() {
            Some( event ) => Ok( Some( event ) ),
            None => {
                thread::sleep( timeout );
                Ok( None )
            }
        }
    }


    #[test]
    fn test_keys_drive_the_transport_until_quit() {
        let c = controller( 3 );
        let cancel = CancellationToken::new();

        run_with( &c, &cancel, scripted( &[ KeyCode::Char( 'n' ), KeyCode::Char( 'n' ), KeyCode::Down, KeyCode::Char( 'q' ) ] ) );

        assert!( cancel.is_cancelled() );
        assert_eq!( c.current_index(), Some( 1 ) );
        assert_eq!( c.volume(), 95 );
    }


    #[test]
    fn test_cancellation_ends_loop_promptly() {
        let c = controller( 1 );
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            thread::spawn( move || {
                thread::sleep( Duration::from_millis( 50 ) );
                cancel.cancel();
            })
        };

        let started = Instant::now();
        run_with( &c, &cancel, scripted( &[] ) );
        canceller.join().unwrap();

        assert!( started.elapsed() < Duration::from_secs( 1 ) );
        assert_eq!( c.current_index(), None );
    }


    #[test]
    fn test_source_failure_cancels_session() {
        let c = controller( 1 );
        let cancel = CancellationToken::new();

        run_with( &c, &cancel, |_| Err( io::Error::new( io::ErrorKind::Other, "no tty" ) ) );
        assert!( cancel.is_cancelled() );
    }


    #[test]
    fn test_no_key_is_handled_after_cancel() {
        let c = controller( 3 );
        let cancel = CancellationToken::new();
        cancel.cancel();

        run_with( &c, &cancel, scripted( &[ KeyCode::Char( 'n' ) ] ) );
        assert_eq!( c.current_index(), None );
        assert_eq!( c.engine().loads(), 0 );
    }
}
