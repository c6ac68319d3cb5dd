//! Playlist and track ordering
//!
//! A playlist is built once at startup and never changes afterwards.
//! The cursor into it is owned by the transport, so this module only
//! provides the wrap-around arithmetic the transport uses to move it.

use std::path::{ Path, PathBuf };


/// A single audio file location.
#[derive( Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash )]
pub struct Track {
    path: PathBuf,
}


impl Track {
    /// Creates a track from a filesystem path.
    pub fn new( path: impl Into<PathBuf> ) -> Self {
        Self { path: path.into() }
    }


    /// Gets the track's path.
    pub fn path( &self ) -> &Path {
        &self.path
    }


    /// Gets the file name for display, falling back to the full path.
    pub fn file_name( &self ) -> String {
        self.path
            .file_name()
            .map( |n| n.to_string_lossy().into_owned() )
            .unwrap_or_else( || self.path.display().to_string() )
    }
}


impl From<PathBuf> for Track {
    fn from( path: PathBuf ) -> Self {
        Self::new( path )
    }
}


/// Ordered, immutable sequence of tracks.
#[derive( Debug, Clone, Default, PartialEq, Eq )]
pub struct Playlist {
    tracks: Vec<Track>,
}


impl Playlist {
    /// Creates a playlist from tracks in load order.
    pub fn new( tracks: impl IntoIterator<Item = Track> ) -> Self {
        Self { tracks: tracks.into_iter().collect() }
    }


    /// Gets all tracks in the playlist.
    pub fn tracks( &self ) -> &[Track] {
        &self.tracks
    }


    /// Gets the track at `index`, if in range.
    pub fn get( &self, index: usize ) -> Option<&Track> {
        self.tracks.get( index )
    }


    /// Gets the number of tracks.
    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    /// Returns true if the playlist is empty.
    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }


    /// Returns true if `index` addresses a track.
    pub fn contains_index( &self, index: usize ) -> bool {
        index < self.tracks.len()
    }


    /// Index following `cursor`, wrapping to the start.
    ///
    /// An unset cursor advances to the first track.
    ///
    /// @param cursor - The current index, or None if nothing is selected
    ///
    /// @returns The next index, or None for an empty playlist
    pub fn index_after( &self, cursor: Option<usize> ) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        Some( cursor.map_or( 0, |i| ( i + 1 ) % self.tracks.len() ) )
    }


    /// Index preceding `cursor`, wrapping to the end.
    ///
    /// An unset cursor steps back to the last track.
    ///
    /// @param cursor - The current index, or None if nothing is selected
    ///
    /// @returns The previous index, or None for an empty playlist
    pub fn index_before( &self, cursor: Option<usize> ) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }
        Some( match cursor {
            Some( i ) if i > 0 && i < len => i - 1,
            _ => len - 1,
        })
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn playlist( n: usize ) -> Playlist {
        Playlist::new( ( 0..n ).map( |i| Track::new( format!( "/music/{:02}.mp3", i ) ) ) )
    }


    #[test]
    fn test_index_after_wraps() {
        let p = playlist( 3 );
        assert_eq!( p.index_after( Some( 0 ) ), Some( 1 ) );
        assert_eq!( p.index_after( Some( 2 ) ), Some( 0 ) );
    }


    #[test]
    fn test_index_after_unset_cursor_starts_at_zero() {
        assert_eq!( playlist( 3 ).index_after( None ), Some( 0 ) );
    }


    #[test]
    fn test_index_before_wraps() {
        let p = playlist( 3 );
        assert_eq!( p.index_before( Some( 1 ) ), Some( 0 ) );
        assert_eq!( p.index_before( Some( 0 ) ), Some( 2 ) );
        assert_eq!( p.index_before( None ), Some( 2 ) );
    }


    #[test]
    fn test_empty_playlist_has_no_neighbours() {
        let p = Playlist::default();
        assert_eq!( p.index_after( Some( 0 ) ), None );
        assert_eq!( p.index_before( None ), None );
        assert!( !p.contains_index( 0 ) );
    }


    #[test]
    fn test_file_name() {
        let track = Track::new( "/music/punk/01 - Intro.flac" );
        assert_eq!( track.file_name(), "01 - Intro.flac" );
    }
}
