use crate::ast::Bracket;

/// Byte offset of the bracket closing the one at `open`, searching no
/// further than `limit`.
///
/// Each bracket family keeps its own depth counter, so `(` is only closed by
/// the `)` that returns the paren depth to zero. String literals and comments
/// are skipped. Stray closers of other families are ignored here; the
/// sub-parse of the region reports them.
pub fn find_closing(source: &str, open: usize, limit: usize, bracket: Bracket) -> Option<usize> {
    let bytes = source.as_bytes();
    let limit = limit.min(bytes.len());
    let mut depth = [0usize; 3];
    depth[family(bracket)] = 1;

    let mut i = open + 1;
    while i < limit {
        match bytes[i] {
            b'"' => i = skip_string(bytes, i, limit)?,
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < limit && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let rest = source.get(i + 2..limit)?;
                i += 2 + rest.find("*/")? + 1;
            }
            b @ (b'(' | b'[' | b'{') => {
                if let Some(opened) = Bracket::from_open(b as char) {
                    depth[family(opened)] += 1;
                }
            }
            b @ (b')' | b']' | b'}') => {
                if let Some(closed) = Bracket::from_close(b as char) {
                    let counter = &mut depth[family(closed)];
                    if *counter > 0 {
                        *counter -= 1;
                        if closed == bracket && *counter == 0 {
                            return Some(i);
                        }
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn family(bracket: Bracket) -> usize {
    match bracket {
        Bracket::Paren => 0,
        Bracket::Square => 1,
        Bracket::Curly => 2,
    }
}

/// Returns the offset of the closing quote of the string opened at `quote`.
fn skip_string(bytes: &[u8], quote: usize, limit: usize) -> Option<usize> {
    let verbatim = quote > 0 && bytes[quote - 1] == b'@';
    let mut i = quote + 1;
    while i < limit {
        match bytes[i] {
            b'\\' if !verbatim => i += 1,
            b'"' if verbatim && bytes.get(i + 1) == Some(&b'"') => i += 1,
            b'"' => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}
