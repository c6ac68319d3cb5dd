//! Transport commands.
//!
//! The fixed set of operations a key press can trigger. The input side
//! decodes keys into these, the transport executes them, and the
//! dashboard uses the same table for its controls legend.


/// Seek step for the arrow keys, in milliseconds.
pub const SEEK_STEP_MS: i64 = 10_000;

/// Volume step for the arrow keys, in percent.
pub const VOLUME_STEP: i32 = 5;


/// A single user-issued transport command.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Command {
    PlayPause,
    Next,
    Previous,
    Seek { offset_ms: i64 },
    Volume { delta: i32 },
    Quit,
}


impl Command {
    /// Commands shown in the controls legend, in display order.
    pub const LEGEND: [Command; 7] = [
        Command::PlayPause,
        Command::Next,
        Command::Previous,
        Command::Seek { offset_ms: -SEEK_STEP_MS },
        Command::Seek { offset_ms: SEEK_STEP_MS },
        Command::Volume { delta: VOLUME_STEP },
        Command::Quit,
    ];


    /// Returns a brief label for the controls legend.
    pub fn description( &self ) -> &'static str {
        match self {
            Command::PlayPause => "PLAY/PAUSE",
            Command::Next => "NEXT",
            Command::Previous => "PREV",
            Command::Seek { offset_ms } if *offset_ms < 0 => "-10s",
            Command::Seek { .. } => "+10s",
            Command::Volume { .. } => "VOL",
            Command::Quit => "QUIT",
        }
    }


    /// Returns the key(s) bound to the command, as shown to the user.
    pub fn key_hint( &self ) -> &'static str {
        match self {
            Command::PlayPause => "[SPACE]",
            Command::Next => "[N]",
            Command::Previous => "[B]",
            Command::Seek { offset_ms } if *offset_ms < 0 => "[←]",
            Command::Seek { .. } => "[→]",
            Command::Volume { .. } => "[↑]/[↓]",
            Command::Quit => "[Q]",
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_seek_labels_follow_direction() {
        assert_eq!( Command::Seek { offset_ms: -SEEK_STEP_MS }.description(), "-10s" );
        assert_eq!( Command::Seek { offset_ms: SEEK_STEP_MS }.key_hint(), "[→]" );
    }


    #[test]
    fn test_legend_covers_every_kind() {
        assert!( Command::LEGEND.contains( &Command::PlayPause ) );
        assert!( Command::LEGEND.contains( &Command::Quit ) );
        assert_eq!( Command::LEGEND.iter().filter( |c| matches!( c, Command::Seek { .. } ) ).count(), 2 );
    }
}
