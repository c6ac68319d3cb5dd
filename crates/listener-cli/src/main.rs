//! Listener CLI - punk audio machine for the terminal

mod cli;
mod glyphs;
mod input;
mod logging;
mod render;
mod render_loop;
mod terminal;
#[cfg( test )]
mod test_support;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{ Context, Result };
use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::Args;
use terminal::TerminalSession;

use listener_core::{
    library::{ self, LibraryError },
    AudioEngine, Playlist, TransportController,
};


const GOODBYE: &str = "LISTENER // session ended. stay punk.";


fn print_usage() {
    println!( "LISTENER // punk audio machine" );
    println!( "usage: listen <path>" );
    println!( "example: listen ~/Music/punk" );
}


fn report_library_error( error: &LibraryError ) {
    if matches!( error, LibraryError::MissingPath ) {
        print_usage();
        return;
    }
    eprintln!( "ERROR: {}", error );
    if matches!( error, LibraryError::EmptyPlaylist( _ ) ) {
        eprintln!( "Supported: {}", library::supported_extensions_display() );
    }
}


/// Routes panics into the log; the terminal is still in raw mode when one
/// happens on a worker thread.
fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook( Box::new( move |info| {
        let thread = std::thread::current();
        tracing::error!( "Panic on thread {}: {}", thread.name().unwrap_or( "<unnamed>" ), info );
        previous( info );
    }));
}


#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok( args ) => args,
        Err( e ) => {
            // Help and version are not failures
            let code = if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
            let _ = e.print();
            return code;
        }
    };

    let path = match args.require_path() {
        Ok( path ) => path.to_path_buf(),
        Err( e ) => {
            report_library_error( &e );
            return ExitCode::FAILURE;
        }
    };

    let log_path = logging::init( args.log_file.clone() );
    install_panic_hook();
    tracing::info!( "Listener {} starting with {:?}", env!( "CARGO_PKG_VERSION" ), path );

    let playlist = match library::resolve( &path ) {
        Ok( playlist ) => playlist,
        Err( e ) => {
            tracing::error!( "Cannot play {:?}: {}", path, e );
            report_library_error( &e );
            return ExitCode::FAILURE;
        }
    };
    tracing::info!( "Loaded {} track(s)", playlist.len() );

    match run( &args, playlist ).await {
        Ok(()) => {
            println!( "{}", GOODBYE );
            ExitCode::SUCCESS
        }
        Err( e ) => {
            tracing::error!( "Session failed: {:#}", e );
            eprintln!( "ERROR: {:#}", e );
            if let Some( log_path ) = log_path {
                eprintln!( "See {}", log_path.display() );
            }
            ExitCode::FAILURE
        }
    }
}


/// Runs one dashboard session until the user quits.
async fn run( args: &Args, playlist: Playlist ) -> Result<()> {
    let engine = AudioEngine::new().context( "No usable audio output" )?;
    let controller = TransportController::new( engine, playlist )
        .start()
        .context( "Failed to start transport" )?;

    controller.set_volume( args.volume as i32 );
    controller.play( 0 );

    let ( mut session, terminal ) = match TerminalSession::enter() {
        Ok( entered ) => entered,
        Err( e ) => {
            controller.shutdown();
            return Err( e ).context( "Failed to set up terminal" );
        }
    };
    let cancel = CancellationToken::new();

    let input = tokio::task::spawn_blocking({
        let controller = Arc::clone( &controller );
        let cancel = cancel.clone();
        move || input::run( controller, cancel )
    });
    let render = tokio::spawn( render_loop::run( terminal, Arc::clone( &controller ), cancel.clone() ) );
    let signal = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = tokio::signal::ctrl_c() => {
                    if result.is_ok() {
                        tracing::info!( "Interrupted" );
                        cancel.cancel();
                    }
                }
            }
        }
    });

    if let Err( e ) = input.await {
        tracing::error!( "Input task failed: {}", e );
    }
    cancel.cancel();

    let terminal = match render.await {
        Ok( terminal ) => Some( terminal ),
        Err( e ) => {
            tracing::error!( "Render task failed: {}", e );
            None
        }
    };
    let _ = signal.await;

    // Joins the event thread, so the engine is released here exactly once
    controller.shutdown();
    match Arc::try_unwrap( controller ) {
        Ok( controller ) => drop( controller ),
        Err( _ ) => tracing::warn!( "Transport still referenced at shutdown" ),
    }
    drop( terminal );
    session.restore();

    tracing::info!( "Session ended" );
    Ok(())
}

