//! Command-line argument parsing for Listener.

use std::path::{ Path, PathBuf };

use clap::Parser;

use listener_core::LibraryError;


/// Listener - punk audio machine for the terminal.
#[derive( Parser, Debug )]
#[command( name = "listen" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Audio file or directory to play (directories are not scanned recursively).
    pub path: Option<PathBuf>,

    /// Initial volume, 0-100.
    #[arg( long, default_value_t = 100, value_parser = clap::value_parser!( u8 ).range( 0..=100 ) )]
    pub volume: u8,

    /// Write logs here instead of the default data directory.
    #[arg( long, value_name = "FILE" )]
    pub log_file: Option<PathBuf>,
}


impl Args {
    /// Gets the path to play. It is optional for clap so that a missing path
    /// can be reported with the usage text and exit code 1.
    pub fn require_path( &self ) -> Result<&Path, LibraryError> {
        self.path.as_deref().ok_or( LibraryError::MissingPath )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_path_is_optional() {
        let args = Args::try_parse_from( [ "listen" ] ).unwrap();
        assert!( args.path.is_none() );
        assert_eq!( args.volume, 100 );
    }


    #[test]
    fn test_parse_path_and_volume() {
        let args = Args::try_parse_from( [ "listen", "--volume", "40", "/music" ] ).unwrap();
        assert_eq!( args.path, Some( PathBuf::from( "/music" ) ) );
        assert_eq!( args.volume, 40 );
    }


    #[test]
    fn test_missing_path_is_an_error() {
        let args = Args::try_parse_from( [ "listen" ] ).unwrap();
        assert!( matches!( args.require_path(), Err( LibraryError::MissingPath ) ) );

        let args = Args::try_parse_from( [ "listen", "song.mp3" ] ).unwrap();
        assert_eq!( args.require_path().unwrap(), Path::new( "song.mp3" ) );
    }


    #[test]
    fn test_volume_out_of_range_is_rejected() {
        assert!( Args::try_parse_from( [ "listen", "--volume", "101", "/music" ] ).is_err() );
    }
}
