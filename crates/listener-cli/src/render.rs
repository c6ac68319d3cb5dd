//! Dashboard composition.
//!
//! [`compose`] maps a transport snapshot and an animation tick to a
//! [`Frame`]: plain ratatui lines with no terminal access and no clock
//! reads, so the same inputs always give the same frame. [`Frame::draw`]
//! lays the lines out on the terminal.

use ratatui::{
    layout::{ Constraint, Direction, Layout, Rect },
    style::{ Color, Modifier, Style, Stylize },
    text::{ Line, Span },
    widgets::{ Block, BorderType, Borders, Padding, Paragraph },
};

use listener_core::{ Command, PlaybackState, TransportSnapshot };

use crate::glyphs::{ self, GLYPH_ROWS };


/// Title spelled out in the header.
const TITLE: &str = "LISTENER";

/// Cells in the volume bar; one cell per 5%.
pub const VOLUME_CELLS: usize = 20;

/// Cells in the progress bar.
pub const PROGRESS_CELLS: usize = 38;

const TAPE_MIN: usize = 8;
const TAPE_MAX: usize = 60;
/// Columns taken by everything on the header row except the tape.
const TAPE_MARGIN: usize = 62;

const LEFT_SPOKES: [&str; 4] = [ "─", "╱", "│", "╲" ];
const RIGHT_SPOKES: [&str; 4] = [ "─", "╲", "│", "╱" ];

const SPEAKER_WIDTH: u16 = 11;
const HEADER_ROWS: u16 = 11;

const GREY23: Color = Color::Indexed( 237 );
const GREY39: Color = Color::Indexed( 241 );
const GREY46: Color = Color::Indexed( 243 );


/// A composed dashboard, ready to draw.
#[derive( Debug, Clone, PartialEq )]
pub struct Frame {
    pub speaker: Vec<Line<'static>>,
    pub header: Vec<Line<'static>>,
    pub queue: Vec<Line<'static>>,
    /// Row in `queue` holding the current track, kept in view when drawing.
    pub current_row: Option<usize>,
    pub now_playing: Vec<Line<'static>>,
    pub controls: Line<'static>,
}


/// Glyph shown for a playback state.
pub fn state_glyph( state: PlaybackState ) -> &'static str {
    match state {
        PlaybackState::Playing => "▶",
        PlaybackState::Paused => "‖",
        PlaybackState::Stopped => "■",
    }
}


/// Renders `text` as four big-letter body rows plus a drop-shadow row.
///
/// The shadow is the bottom body row shifted one column right, drawn with
/// `▓`. Trailing blanks are trimmed from every row.
pub fn big_text_rows( text: &str ) -> [String; GLYPH_ROWS + 1] {
    let mut rows: [String; GLYPH_ROWS + 1] = Default::default();

    for c in text.chars() {
        let glyph = glyphs::glyph( c );
        for ( row, pattern ) in rows.iter_mut().zip( glyph.iter() ) {
            row.push_str( pattern );
            row.push( ' ' );
        }
    }

    let shadow = rows[ GLYPH_ROWS - 1 ].replace( '█', "▓" );
    rows[ GLYPH_ROWS ] = format!( " {}", shadow );

    for row in rows.iter_mut() {
        row.truncate( row.trim_end().len() );
    }
    rows
}


/// Tape length for a terminal `term_width` columns wide.
///
/// Forced odd so the marker, stepping two columns per tick, visits every
/// column once per lap.
pub fn tape_width( term_width: u16 ) -> usize {
    let width = ( term_width as usize ).saturating_sub( TAPE_MARGIN ).clamp( TAPE_MIN, TAPE_MAX );
    if width % 2 == 0 { width - 1 } else { width }
}


/// Column of the tape marker; scrolls right to left.
pub fn tape_marker_position( width: usize, tick: u64 ) -> usize {
    if width == 0 {
        return 0;
    }
    let step = ( ( tick % width as u64 ) * 2 % width as u64 ) as usize;
    width - 1 - step
}


/// A tape line of `═` with a single `╪` marker.
pub fn scrolling_tape( width: usize, tick: u64 ) -> String {
    let marker = tape_marker_position( width, tick );
    ( 0..width ).map( |i| if i == marker { '╪' } else { '═' } ).collect()
}


/// Reel rotation phase, 0-3.
pub fn spoke_phase( tick: u64 ) -> usize {
    ( tick % 4 ) as usize
}


/// Filled cells of the volume bar.
pub fn volume_cells( volume: u8 ) -> usize {
    ( ( volume.min( 100 ) as f64 / 5.0 ).round() as usize ).min( VOLUME_CELLS )
}


/// Filled cells of the progress bar; empty while the duration is unknown.
pub fn progress_cells( position_ms: u64, duration_ms: u64 ) -> usize {
    let fraction = if duration_ms > 0 {
        ( position_ms as f64 / duration_ms as f64 ).clamp( 0.0, 1.0 )
    } else {
        0.0
    };
    ( fraction * PROGRESS_CELLS as f64 ).round() as usize
}


/// Formats milliseconds as `MM:SS`, or `HH:MM:SS` from one hour up.
pub fn format_time( ms: u64 ) -> String {
    let secs = ms / 1000;
    let ( h, m, s ) = ( secs / 3600, ( secs / 60 ) % 60, secs % 60 );
    if h > 0 {
        format!( "{:02}:{:02}:{:02}", h, m, s )
    } else {
        format!( "{:02}:{:02}", m, s )
    }
}


fn bar( filled: usize, cells: usize ) -> String {
    let filled = filled.min( cells );
    format!( "{}{}", "█".repeat( filled ), "░".repeat( cells - filled ) )
}


fn starfield( pattern: &str ) -> Line<'static> {
    let spans: Vec<Span<'static>> = pattern
        .chars()
        .map( |c| {
            let color = match c {
                '★' | '✦' => Color::Yellow,
                '*' => Color::White,
                _ => GREY39,
            };
            Span::styled( c.to_string(), Style::default().fg( color ) )
        })
        .collect();
    Line::from( spans ).centered()
}


fn speaker() -> Vec<Line<'static>> {
    let red = Style::default().fg( Color::Red );
    let grille = |pattern: &'static str| Line::from( vec![
        Span::styled( "║", red ),
        Span::styled( pattern, Style::default().fg( GREY46 ) ),
        Span::styled( "║", red ),
    ]);
    let cone = |pattern: &'static str, color: Color| Line::from( vec![
        Span::styled( "║", red ),
        Span::styled( pattern, Style::default().fg( color ) ),
        Span::styled( "║", red ),
    ]);

    vec![
        Line::styled( "╔═══════╗", red ),
        grille( "▐▌▐▌▐▌▐" ),
        grille( "▌▐▌▐▌▐▌" ),
        grille( "▐▌▐▌▐▌▐" ),
        grille( "▌▐▌▐▌▐▌" ),
        Line::styled( "╠═══════╣", red ),
        cone( " ╭───╮ ", Color::White ),
        cone( " │ ● │ ", Color::Yellow ),
        cone( " ╰───╯ ", Color::White ),
        cone( "  ───  ", GREY46 ),
        Line::styled( "╚═══════╝", red ),
    ]
}


fn header( snapshot: &TransportSnapshot, tick: u64, term_width: u16 ) -> Vec<Line<'static>> {
    let red = Style::default().fg( Color::Red );
    let yellow = Style::default().fg( Color::Yellow );
    let grey = Style::default().fg( GREY46 );

    let phase = spoke_phase( tick );
    let ( ls, rs ) = ( LEFT_SPOKES[ phase ], RIGHT_SPOKES[ phase ] );
    let width = tape_width( term_width );
    let edge = "─".repeat( width );

    let big = big_text_rows( TITLE );
    let mut lines = Vec::with_capacity( HEADER_ROWS as usize );

    lines.push( starfield( "· ★ · * · ★ · * · ★ · * · ✦ ·" ) );
    for ( i, row ) in big[ ..GLYPH_ROWS ].iter().enumerate() {
        let color = if i == 0 { Color::Yellow } else { Color::Red };
        lines.push( Line::styled( row.clone(), Style::default().fg( color ).bold() ).centered() );
    }
    lines.push( Line::styled( big[ GLYPH_ROWS ].clone(), Style::default().fg( GREY23 ) ).centered() );
    lines.push( starfield( "* · ✦ · * · ★ · * · ✦ · * · ★ ·" ) );

    lines.push( Line::from( vec![
        Span::styled( "╭───╮", red ),
        Span::styled( edge.clone(), grey ),
        Span::styled( "╭───╮", red ),
    ]).centered() );
    lines.push( Line::from( vec![
        Span::styled( "│", red ),
        Span::styled( format!( "{}●{}", ls, ls ), yellow ),
        Span::styled( "│", red ),
        Span::styled( scrolling_tape( width, tick ), red ),
        Span::styled( "│", red ),
        Span::styled( format!( "{}●{}", rs, rs ), yellow ),
        Span::styled( "│", red ),
    ]).centered() );
    lines.push( Line::from( vec![
        Span::styled( "╰───╯", red ),
        Span::styled( edge, grey ),
        Span::styled( "╰───╯", red ),
    ]).centered() );

    lines.push( Line::from( vec![
        Span::styled( state_glyph( snapshot.state ), red.bold() ),
        Span::raw( "   " ),
        Span::styled( "VOL", grey ),
        Span::raw( " " ),
        Span::styled( bar( volume_cells( snapshot.volume ), VOLUME_CELLS ), red ),
        Span::raw( " " ),
        Span::styled( format!( "{:03}%", snapshot.volume ), Style::default().fg( Color::White ).bold() ),
    ]).centered() );

    lines
}


fn queue( snapshot: &TransportSnapshot ) -> Vec<Line<'static>> {
    if snapshot.playlist.is_empty() {
        return vec![ Line::styled( "  No audio files found.", Style::default().fg( GREY46 ) ) ];
    }

    snapshot.playlist
        .tracks()
        .iter()
        .enumerate()
        .map( |( i, track )| {
            let number = format!( "{:>4}  ", format!( "{:02}", i + 1 ) );
            if Some( i ) == snapshot.current_index {
                Line::from( vec![
                    Span::styled( number, Style::default().fg( Color::Red ).bold() ),
                    Span::styled(
                        format!( " {} {} ", state_glyph( snapshot.state ), track.file_name().to_uppercase() ),
                        Style::default().fg( Color::White ).bg( Color::Red ).add_modifier( Modifier::BOLD ),
                    ),
                ])
            } else {
                Line::from( vec![
                    Span::styled( number, Style::default().fg( GREY46 ) ),
                    Span::styled( track.file_name(), Style::default().fg( Color::White ) ),
                ])
            }
        })
        .collect()
}


fn now_playing( snapshot: &TransportSnapshot ) -> Vec<Line<'static>> {
    let title = snapshot
        .current_track()
        .map( |t| t.file_name().to_uppercase() )
        .unwrap_or_else( || "── NO TRACK SELECTED ──".to_string() );
    let remaining = snapshot.duration_ms.saturating_sub( snapshot.position_ms );

    vec![
        Line::styled(
            format!( " {}  {} ", state_glyph( snapshot.state ), title ),
            Style::default().fg( Color::Yellow ).bold(),
        ).centered(),
        Line::from( vec![
            Span::styled( format_time( snapshot.position_ms ), Style::default().fg( Color::Red ).bold() ),
            Span::raw( "  " ),
            Span::styled(
                bar( progress_cells( snapshot.position_ms, snapshot.duration_ms ), PROGRESS_CELLS ),
                Style::default().fg( Color::Red ),
            ),
            Span::raw( "  " ),
            Span::styled( format_time( remaining ), Style::default().fg( GREY46 ) ),
        ]).centered(),
    ]
}


fn controls() -> Line<'static> {
    let mut spans = Vec::new();
    for ( i, command ) in Command::LEGEND.iter().enumerate() {
        if i > 0 {
            spans.push( Span::raw( "  " ) );
        }
        spans.push( Span::styled( command.key_hint(), Style::default().fg( GREY46 ) ) );
        spans.push( Span::raw( " " ) );
        spans.push( Span::styled( command.description(), Style::default().fg( Color::White ) ) );
    }
    Line::from( spans ).centered()
}


/// Builds the frame for `snapshot` at animation `tick`.
///
/// @param snapshot - Transport state to show
/// @param tick - Animation counter driving the reels and tape
/// @param term_width - Terminal width, used to size the tape
pub fn compose( snapshot: &TransportSnapshot, tick: u64, term_width: u16 ) -> Frame {
    Frame {
        speaker: speaker(),
        header: header( snapshot, tick, term_width ),
        queue: queue( snapshot ),
        current_row: snapshot.current_index.filter( |i| *i < snapshot.playlist.len() ),
        now_playing: now_playing( snapshot ),
        controls: controls(),
    }
}


fn panel( title: &'static str ) -> Block<'static> {
    Block::default()
        .borders( Borders::ALL )
        .border_type( BorderType::Thick )
        .border_style( Style::default().fg( Color::Red ) )
        .title( Span::styled( title, Style::default().fg( Color::Red ).bold() ) )
        .padding( Padding::horizontal( 1 ) )
}


impl Frame {
    /// Lays the frame out over the whole terminal.
    pub fn draw( &self, frame: &mut ratatui::Frame ) {
        let outer = Block::default()
            .borders( Borders::ALL )
            .border_type( BorderType::Thick )
            .border_style( Style::default().fg( Color::Red ) );
        let area = outer.inner( frame.area() );
        frame.render_widget( outer, frame.area() );

        let chunks = Layout::default()
            .direction( Direction::Vertical )
            .constraints([
                Constraint::Length( HEADER_ROWS + 2 ),  // Header
                Constraint::Min( 3 ),                   // Queue
                Constraint::Length( 4 ),                // Now playing
                Constraint::Length( 1 ),                // Controls
            ])
            .split( area );

        self.draw_header( frame, chunks[ 0 ] );
        self.draw_queue( frame, chunks[ 1 ] );
        frame.render_widget( Paragraph::new( self.now_playing.clone() ).block( panel( " NOW PLAYING " ) ), chunks[ 2 ] );
        frame.render_widget( Paragraph::new( self.controls.clone() ), chunks[ 3 ] );
    }


    fn draw_header( &self, frame: &mut ratatui::Frame, area: Rect ) {
        let block = Block::default()
            .borders( Borders::ALL )
            .border_type( BorderType::Thick )
            .border_style( Style::default().fg( Color::Red ) );
        let inner = block.inner( area );
        frame.render_widget( block, area );

        let columns = Layout::default()
            .direction( Direction::Horizontal )
            .constraints([
                Constraint::Length( SPEAKER_WIDTH ),
                Constraint::Min( 0 ),
                Constraint::Length( SPEAKER_WIDTH ),
            ])
            .split( inner );

        let speaker = Paragraph::new( self.speaker.clone() ).centered();
        frame.render_widget( speaker.clone(), columns[ 0 ] );
        frame.render_widget( Paragraph::new( self.header.clone() ), columns[ 1 ] );
        frame.render_widget( speaker, columns[ 2 ] );
    }


    fn draw_queue( &self, frame: &mut ratatui::Frame, area: Rect ) {
        let visible = area.height.saturating_sub( 2 ) as usize;
        let offset = match self.current_row {
            Some( row ) if visible > 0 && row >= visible => {
                let centered = row.saturating_sub( visible / 2 );
                centered.min( self.queue.len().saturating_sub( visible ) )
            }
            _ => 0,
        };

        let list = Paragraph::new( self.queue.clone() )
            .block( panel( " QUEUE " ) )
            .scroll(( offset as u16, 0 ));
        frame.render_widget( list, area );
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::collections::BTreeSet;
    use std::sync::Arc;

    use listener_core::{ Playlist, Track };


    fn text( line: &Line ) -> String {
        line.spans.iter().map( |s| s.content.as_ref() ).collect()
    }


    fn snapshot( state: PlaybackState, current: Option<usize> ) -> TransportSnapshot {
        TransportSnapshot {
            state,
            current_index: current,
            position_ms: 30_000,
            duration_ms: 60_000,
            volume: 55,
            playlist: Arc::new( Playlist::new( [
                Track::new( "/music/01 - Intro.mp3" ),
                Track::new( "/music/02 - Riot.flac" ),
            ])),
        }
    }


    #[test]
    fn test_big_text_rows() {
        let rows = big_text_rows( "LISTENER" );
        assert_eq!( rows[ 0 ], "█     █████ ████  █████ █████ █   █ █████ ████" );
        assert_eq!( rows[ 4 ], format!( " {}", rows[ 3 ].replace( '█', "▓" ) ) );
    }


    #[test]
    fn test_big_text_unknown_character_is_blank() {
        let rows = big_text_rows( "L#L" );
        assert_eq!( rows[ 0 ], "█           █" );
    }


    #[test]
    fn test_tape_width_is_clamped_and_odd() {
        assert_eq!( tape_width( 80 ), 17 );
        assert_eq!( tape_width( 81 ), 19 );
        assert_eq!( tape_width( 20 ), 7 );
        assert_eq!( tape_width( 300 ), 59 );
    }


    #[test]
    fn test_tape_scrolls_left() {
        assert_eq!( scrolling_tape( 9, 0 ), "════════╪" );
        assert_eq!( scrolling_tape( 9, 1 ), "══════╪══" );
    }


    #[test]
    fn test_tape_marker_is_periodic_and_visits_every_column() {
        for width in [ 7, 9, 17, 59 ] {
            let visited: BTreeSet<usize> = ( 0..width as u64 )
                .map( |tick| tape_marker_position( width, tick ) )
                .collect();
            assert_eq!( visited.len(), width );

            for tick in 0..200 {
                assert_eq!(
                    tape_marker_position( width, tick ),
                    tape_marker_position( width, tick + width as u64 )
                );
            }
        }
    }


    #[test]
    fn test_spoke_phase_period() {
        for tick in 0..40 {
            assert_eq!( spoke_phase( tick ), spoke_phase( tick + 4 ) );
        }
        assert_eq!( ( 0..4 ).map( spoke_phase ).collect::<Vec<_>>(), vec![ 0, 1, 2, 3 ] );
    }


    #[test]
    fn test_volume_cells() {
        assert_eq!( volume_cells( 0 ), 0 );
        assert_eq!( volume_cells( 2 ), 0 );
        assert_eq!( volume_cells( 55 ), 11 );
        assert_eq!( volume_cells( 98 ), 20 );
        assert_eq!( volume_cells( 100 ), 20 );
    }


    #[test]
    fn test_progress_cells() {
        assert_eq!( progress_cells( 5000, 0 ), 0 );
        assert_eq!( progress_cells( 30_000, 60_000 ), 19 );
        assert_eq!( progress_cells( 90_000, 60_000 ), PROGRESS_CELLS );
    }


    #[test]
    fn test_format_time() {
        assert_eq!( format_time( 0 ), "00:00" );
        assert_eq!( format_time( 65_999 ), "01:05" );
        assert_eq!( format_time( 3_725_000 ), "01:02:05" );
    }


    #[test]
    fn test_compose_is_deterministic() {
        let snap = snapshot( PlaybackState::Playing, Some( 1 ) );
        assert_eq!( compose( &snap, 7, 100 ), compose( &snap, 7, 100 ) );
        assert_ne!( compose( &snap, 7, 100 ), compose( &snap, 8, 100 ) );
    }


    #[test]
    fn test_header_rows() {
        let frame = compose( &snapshot( PlaybackState::Paused, Some( 0 ) ), 1, 80 );
        assert_eq!( frame.header.len(), HEADER_ROWS as usize );
        assert_eq!( frame.speaker.len(), HEADER_ROWS as usize );

        assert_eq!( text( &frame.header[ 8 ] ), "│╱●╱│══════════════╪══│╲●╲│" );
        assert_eq!( text( &frame.header[ 10 ] ), "‖   VOL ███████████░░░░░░░░░ 055%" );
    }


    #[test]
    fn test_queue_marks_current_track() {
        let frame = compose( &snapshot( PlaybackState::Playing, Some( 1 ) ), 0, 80 );
        assert_eq!( text( &frame.queue[ 0 ] ), "  01  01 - Intro.mp3" );
        assert_eq!( text( &frame.queue[ 1 ] ), "  02   ▶ 02 - RIOT.FLAC " );
        assert_eq!( frame.current_row, Some( 1 ) );
    }


    #[test]
    fn test_queue_placeholder_when_empty() {
        let mut snap = snapshot( PlaybackState::Stopped, None );
        snap.playlist = Arc::new( Playlist::default() );
        let frame = compose( &snap, 0, 80 );
        assert_eq!( frame.queue.len(), 1 );
        assert_eq!( text( &frame.queue[ 0 ] ), "  No audio files found." );
        assert_eq!( frame.current_row, None );
    }


    #[test]
    fn test_now_playing() {
        let frame = compose( &snapshot( PlaybackState::Stopped, Some( 0 ) ), 0, 80 );
        assert_eq!( text( &frame.now_playing[ 0 ] ), " ■  01 - INTRO.MP3 " );
        assert_eq!(
            text( &frame.now_playing[ 1 ] ),
            format!( "00:30  {}{}  00:30", "█".repeat( 19 ), "░".repeat( 19 ) )
        );

        let idle = compose( &snapshot( PlaybackState::Stopped, None ), 0, 80 );
        assert_eq!( text( &idle.now_playing[ 0 ] ), " ■  ── NO TRACK SELECTED ── " );
    }


    #[test]
    fn test_controls_legend() {
        let frame = compose( &snapshot( PlaybackState::Stopped, None ), 0, 80 );
        assert_eq!(
            text( &frame.controls ),
            "[SPACE] PLAY/PAUSE  [N] NEXT  [B] PREV  [←] -10s  [→] +10s  [↑]/[↓] VOL  [Q] QUIT"
        );
    }
}
