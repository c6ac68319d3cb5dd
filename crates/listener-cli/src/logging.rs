//! Log file setup.
//!
//! The terminal belongs to the dashboard, so logs go to a file. `RUST_LOG`
//! selects the level (default `info`).

use std::fs::{ self, File, OpenOptions };
use std::path::{ Path, PathBuf };
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;


/// Default log location under the platform data directory.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::data_local_dir().map( |d| d.join( "listener" ).join( "listener.log" ) )
}


fn open_log( path: &Path ) -> std::io::Result<File> {
    if let Some( parent ) = path.parent() {
        fs::create_dir_all( parent )?;
    }
    OpenOptions::new().create( true ).append( true ).open( path )
}


/// Installs the global subscriber.
///
/// Returns the log path in use, or None if logging is disabled because no
/// file could be opened.
pub fn init( path: Option<PathBuf> ) -> Option<PathBuf> {
    let path = path.or_else( default_log_path )?;
    let file = open_log( &path ).ok()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else( |_| EnvFilter::new( "info" ) );

    let installed = tracing_subscriber::fmt()
        .with_writer( Mutex::new( file ) )
        .with_ansi( false )
        .with_target( true )
        .with_thread_names( true )
        .with_env_filter( filter )
        .try_init()
        .is_ok();

    installed.then_some( path )
}
