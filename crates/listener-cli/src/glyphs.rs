//! Big-letter font for the dashboard header.
//!
//! Each glyph is 5 columns by 4 rows of `█`/space. Characters without a
//! glyph render blank.


/// Width of one glyph, without the gap that follows it.
pub const GLYPH_WIDTH: usize = 5;

/// Body rows per glyph.
pub const GLYPH_ROWS: usize = 4;

const BLANK: [&str; GLYPH_ROWS] = [ "     ", "     ", "     ", "     " ];


/// Looks up the rows for `c` (case-insensitive).
pub fn glyph( c: char ) -> [&'static str; GLYPH_ROWS] {
    match c.to_ascii_uppercase() {
        'A' => [ " ███ ", "█   █", "█████", "█   █" ],
        'C' => [ " ████", "█    ", "█    ", " ████" ],
        'D' => [ "████ ", "█   █", "█   █", "████ " ],
        'E' => [ "█████", "████ ", "█    ", "█████" ],
        'G' => [ " ████", "█    ", "█  ██", " ████" ],
        'H' => [ "█   █", "█████", "█   █", "█   █" ],
        'I' => [ "█████", "  █  ", "  █  ", "█████" ],
        'K' => [ "█   █", "████ ", "████ ", "█   █" ],
        'L' => [ "█    ", "█    ", "█    ", "█████" ],
        'M' => [ "█   █", "█████", "█ █ █", "█   █" ],
        'N' => [ "█   █", "██  █", "█  ██", "█   █" ],
        'O' => [ " ███ ", "█   █", "█   █", " ███ " ],
        'P' => [ "████ ", "█   █", "████ ", "█    " ],
        'R' => [ "████ ", "█   █", "████ ", "█   █" ],
        'S' => [ "████ ", "███  ", "  ███", " ████" ],
        'T' => [ "█████", "  █  ", "  █  ", "  █  " ],
        'U' => [ "█   █", "█   █", "█   █", " ███ " ],
        '0' => [ " ███ ", "█   █", "█   █", " ███ " ],
        '1' => [ " ██  ", " ██  ", " ██  ", "████ " ],
        '2' => [ "████ ", "  ██ ", " ██  ", "█████" ],
        '3' => [ "████ ", "  ██ ", "  ██ ", "████ " ],
        _ => BLANK,
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_every_glyph_is_five_wide() {
        for c in "ACDEGHIKLMNOPRSTU0123 ?".chars() {
            for row in glyph( c ) {
                assert_eq!( row.chars().count(), GLYPH_WIDTH, "glyph {:?}", c );
            }
        }
    }


    #[test]
    fn test_lookup_ignores_case() {
        assert_eq!( glyph( 'l' ), glyph( 'L' ) );
    }


    #[test]
    fn test_unknown_is_blank() {
        assert_eq!( glyph( '#' ), BLANK );
    }
}
