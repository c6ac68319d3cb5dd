//! Periodic dashboard redraw.

use std::panic::{ self, AssertUnwindSafe };
use std::sync::Arc;
use std::time::Duration;

use ratatui::{ backend::Backend, Terminal };
use tokio::time::{ self, MissedTickBehavior };
use tokio_util::sync::CancellationToken;

use listener_core::{ PlaybackEngine, TransportController };

use crate::render;


/// Redraw period. Also the animation step.
pub const FRAME_INTERVAL: Duration = Duration::from_millis( 200 );


/// Animation counter, advanced once per drawn frame.
#[derive( Debug, Default, Clone, Copy, PartialEq, Eq )]
pub struct AnimationTick( u64 );


impl AnimationTick {
    pub fn get( self ) -> u64 {
        self.0
    }


    /// Returns the current value and moves to the next one.
    pub fn advance( &mut self ) -> u64 {
        let current = self.0;
        self.0 = self.0.wrapping_add( 1 );
        current
    }
}


/// Draws one frame for the controller's current state.
fn draw_frame<B: Backend, E: PlaybackEngine>(
    terminal: &mut Terminal<B>,
    controller: &TransportController<E>,
    tick: u64,
) -> std::io::Result<()> {
    let snapshot = controller.snapshot();
    terminal.draw( |frame| {
        render::compose( &snapshot, tick, frame.area().width ).draw( frame );
    })?;
    Ok(())
}


/// Redraws the dashboard every [`FRAME_INTERVAL`] until `cancel` fires,
/// then draws once more so the last state is on screen.
///
/// A failed or panicking frame is logged and skipped.
pub async fn run<B: Backend, E: PlaybackEngine>(
    mut terminal: Terminal<B>,
    controller: Arc<TransportController<E>>,
    cancel: CancellationToken,
) -> Terminal<B> {
    let mut interval = time::interval( FRAME_INTERVAL );
    interval.set_missed_tick_behavior( MissedTickBehavior::Skip );
    let mut tick = AnimationTick::default();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let current = tick.advance();
        let result = panic::catch_unwind( AssertUnwindSafe( || {
            draw_frame( &mut terminal, &controller, current )
        }));
        match result {
            Ok( Ok(()) ) => {}
            Ok( Err( e ) ) => tracing::warn!( "Failed to draw frame: {}", e ),
            Err( _ ) => tracing::error!( "Frame {} panicked while drawing", current ),
        }
    }

    if let Err( e ) = draw_frame( &mut terminal, &controller, tick.get() ) {
        tracing::debug!( "Final frame not drawn: {}", e );
    }
    tracing::debug!( "Render loop finished" );
    terminal
}


#[cfg( test )]
mod tests {
    use super::*;

    use ratatui::backend::TestBackend;

    use crate::test_support::controller;


    fn screen( terminal: &Terminal<TestBackend> ) -> String {
        terminal.backend().buffer().content().iter().map( |cell| cell.symbol() ).collect()
    }


    #[test]
    fn test_tick_advances_by_one() {
        let mut tick = AnimationTick::default();
        assert_eq!( tick.advance(), 0 );
        assert_eq!( tick.advance(), 1 );
        assert_eq!( tick.get(), 2 );
    }


    #[test]
    fn test_tick_wraps() {
        let mut tick = AnimationTick( u64::MAX );
        assert_eq!( tick.advance(), u64::MAX );
        assert_eq!( tick.get(), 0 );
    }


    #[tokio::test]
    async fn test_cancel_ends_loop_after_final_frame() {
        let terminal = Terminal::new( TestBackend::new( 100, 40 ) ).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let terminal = time::timeout( Duration::from_secs( 2 ), run( terminal, Arc::new( controller( 2 ) ), cancel ) )
            .await
            .expect( "render loop kept running after cancel" );

        let text = screen( &terminal );
        assert!( text.contains( " NOW PLAYING " ) );
        assert!( text.contains( "NO TRACK SELECTED" ) );
    }


    #[tokio::test]
    async fn test_final_frame_shows_latest_state() {
        let terminal = Terminal::new( TestBackend::new( 100, 40 ) ).unwrap();
        let transport = Arc::new( controller( 2 ) );
        let cancel = CancellationToken::new();

        let task = tokio::spawn( run( terminal, Arc::clone( &transport ), cancel.clone() ) );
        time::sleep( FRAME_INTERVAL * 2 ).await;

        transport.play( 1 );
        cancel.cancel();

        let terminal = time::timeout( Duration::from_secs( 2 ), task )
            .await
            .expect( "render loop kept running after cancel" )
            .unwrap();
        assert!( screen( &terminal ).contains( "02 - SONG.MP3" ) );
    }
}
