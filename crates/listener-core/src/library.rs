//! Track discovery
//!
//! Turns the single path given on the command line into a playlist:
//! either one supported file, or every supported file directly inside
//! a directory (no recursion), sorted by path.

use std::path::{ Path, PathBuf };

use thiserror::Error;

use crate::playlist::{ Playlist, Track };


/// Supported audio file extensions, lowercase and without the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "aac", "flac", "wav", "ogg", "m4a", "opus", "wma",
];


/// Errors that can occur while resolving the startup path.
#[derive( Debug, Error )]
pub enum LibraryError {
    #[error( "No path given" )]
    MissingPath,

    #[error( "Path not found: {}", .0.display() )]
    PathNotFound( PathBuf ),

    #[error( "Unsupported file type: {0}" )]
    UnsupportedFormat( String ),

    #[error( "No audio files found in {}", .0.display() )]
    EmptyPlaylist( PathBuf ),

    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),
}


/// Returns the supported extensions formatted for display (`.mp3, .aac, ...`).
pub fn supported_extensions_display() -> String {
    SUPPORTED_EXTENSIONS
        .iter()
        .map( |e| format!( ".{}", e ) )
        .collect::<Vec<_>>()
        .join( ", " )
}


/// Builds the playlist for a file or directory path.
///
/// @param path - A single audio file, or a directory to scan (non-recursive)
///
/// @returns The playlist, or the reason no playlist could be built
pub fn resolve( path: &Path ) -> Result<Playlist, LibraryError> {
    if path.is_dir() {
        let tracks = scan_directory( path )?;
        if tracks.is_empty() {
            return Err( LibraryError::EmptyPlaylist( path.to_path_buf() ) );
        }
        tracing::info!( "Found {} tracks in {:?}", tracks.len(), path );
        return Ok( Playlist::new( tracks ) );
    }

    if !path.exists() {
        return Err( LibraryError::PathNotFound( path.to_path_buf() ) );
    }

    if !is_audio_file( path ) {
        let ext = path.extension()
            .map( |e| format!( ".{}", e.to_string_lossy().to_lowercase() ) )
            .unwrap_or_default();
        return Err( LibraryError::UnsupportedFormat( ext ) );
    }

    Ok( Playlist::new( [ Track::new( path ) ] ) )
}


/// Lists supported files directly inside `dir`, sorted by path.
pub fn scan_directory( dir: &Path ) -> Result<Vec<Track>, LibraryError> {
    let entries = match std::fs::read_dir( dir ) {
        Ok( e ) => e,
        Err( e ) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err( LibraryError::PathNotFound( dir.to_path_buf() ) );
        }
        Err( e ) => return Err( LibraryError::Io( e ) ),
    };

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map( |entry| entry.path() )
        .filter( |path| path.is_file() && is_audio_file( path ) )
        .collect();
    paths.sort();

    Ok( paths.into_iter().map( Track::new ).collect() )
}


/// Checks if a file has a supported audio extension (case-insensitive).
pub fn is_audio_file( path: &Path ) -> bool {
    path.extension()
        .and_then( |e| e.to_str() )
        .map( |e| SUPPORTED_EXTENSIONS.contains( &e.to_lowercase().as_str() ) )
        .unwrap_or( false )
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::fs;


    fn touch( dir: &Path, name: &str ) -> PathBuf {
        let path = dir.join( name );
        fs::write( &path, b"" ).unwrap();
        path
    }


    #[test]
    fn test_is_audio_file_ignores_case() {
        assert!( is_audio_file( Path::new( "song.MP3" ) ) );
        assert!( is_audio_file( Path::new( "song.Opus" ) ) );
        assert!( !is_audio_file( Path::new( "cover.jpg" ) ) );
        assert!( !is_audio_file( Path::new( "README" ) ) );
    }


    #[test]
    fn test_directory_scan_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        touch( dir.path(), "b.flac" );
        touch( dir.path(), "a.mp3" );
        touch( dir.path(), "notes.txt" );
        touch( dir.path(), "C.WAV" );

        let playlist = resolve( dir.path() ).unwrap();
        let names: Vec<_> = playlist.tracks().iter().map( |t| t.file_name() ).collect();
        assert_eq!( names, vec![ "C.WAV", "a.mp3", "b.flac" ] );
    }


    #[test]
    fn test_directory_scan_is_not_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join( "nested" );
        fs::create_dir( &nested ).unwrap();
        touch( &nested, "deep.mp3" );
        touch( dir.path(), "top.ogg" );

        let playlist = resolve( dir.path() ).unwrap();
        assert_eq!( playlist.len(), 1 );
        assert_eq!( playlist.tracks()[ 0 ].file_name(), "top.ogg" );
    }


    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        touch( dir.path(), "cover.png" );
        assert!( matches!( resolve( dir.path() ), Err( LibraryError::EmptyPlaylist( _ ) ) ) );
    }


    #[test]
    fn test_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = touch( dir.path(), "track.m4a" );
        let playlist = resolve( &file ).unwrap();
        assert_eq!( playlist.tracks(), &[ Track::new( file ) ] );
    }


    #[test]
    fn test_unsupported_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = touch( dir.path(), "clip.MKV" );
        match resolve( &file ) {
            Err( LibraryError::UnsupportedFormat( ext ) ) => assert_eq!( ext, ".mkv" ),
            other => panic!( "unexpected result: {:?}", other ),
        }
    }


    #[test]
    fn test_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join( "nope" );
        assert!( matches!( resolve( &missing ), Err( LibraryError::PathNotFound( _ ) ) ) );
    }


    #[test]
    fn test_supported_extensions_display() {
        assert_eq!(
            supported_extensions_display(),
            ".mp3, .aac, .flac, .wav, .ogg, .m4a, .opus, .wma"
        );
    }
}
