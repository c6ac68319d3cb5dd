//! Terminal session guard.

use std::io::{ self, Stdout };

use crossterm::{
    cursor::{ Hide, MoveTo, Show },
    terminal::{ disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen },
    ExecutableCommand,
};
use ratatui::{ backend::CrosstermBackend, Terminal };


pub type Backend = CrosstermBackend<Stdout>;


/// Puts the terminal into dashboard mode and restores it on drop.
///
/// Restoring runs on every exit path, including unwinding out of a panic.
pub struct TerminalSession {
    restored: bool,
}


impl TerminalSession {
    /// Enters raw mode and the alternate screen, and hides the cursor.
    pub fn enter() -> io::Result<( Self, Terminal<Backend> )> {
        enable_raw_mode()?;
        // From here on, drop undoes whatever part of the setup happened
        let session = Self { restored: false };

        let mut stdout = io::stdout();
        stdout.execute( EnterAlternateScreen )?;
        stdout.execute( Hide )?;
        stdout.execute( Clear( ClearType::All ) )?;

        let terminal = Terminal::new( CrosstermBackend::new( io::stdout() ) )?;
        Ok(( session, terminal ))
    }


    /// Restores the terminal now. Later calls and the drop are no-ops.
    pub fn restore( &mut self ) {
        if self.restored {
            return;
        }
        self.restored = true;

        let mut stdout = io::stdout();
        if let Err( e ) = stdout.execute( Show ) {
            tracing::warn!( "Failed to show cursor: {}", e );
        }
        if let Err( e ) = stdout.execute( LeaveAlternateScreen ) {
            tracing::warn!( "Failed to leave alternate screen: {}", e );
        }
        if let Err( e ) = disable_raw_mode() {
            tracing::warn!( "Failed to disable raw mode: {}", e );
        }
        let _ = stdout.execute( Clear( ClearType::All ) ).and_then( |out| out.execute( MoveTo( 0, 0 ) ) );
    }
}


impl Drop for TerminalSession {
    fn drop( &mut self ) {
        self.restore();
    }
}
