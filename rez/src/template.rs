/*!
Compiled layout and content templates. Author-supplied template strings are
split into literal text and `${expression}` chunks at process time; rendering
the chunks against game state belongs to the runtime.
*/

use memchr::memchr;
use serde::Serialize;
use thiserror::Error;

/// One piece of a compiled template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Chunk {
    /// Literal text, emitted verbatim
    Text(String),

    /// An interpolated expression, evaluated at render time
    Expr(String),
}

/// A compiled template: the chunks of the source string, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Template {
    chunks: Vec<Chunk>,
}

/// Errors raised while compiling a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A `${` with no closing brace
    #[error("unterminated ${{...}} expression")]
    Unterminated,
}

impl Template {
    /// Split a template string into text and expression chunks.
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        let mut chunks = Vec::new();
        let mut rest = source;

        loop {
            match find_expr_start(rest) {
                None => {
                    if !rest.is_empty() {
                        chunks.push(Chunk::Text(rest.to_owned()));
                    }
                    return Ok(Template { chunks });
                }
                Some(start) => {
                    if start > 0 {
                        chunks.push(Chunk::Text(rest[..start].to_owned()));
                    }

                    let body = &rest[start + 2..];
                    match memchr(b'}', body.as_bytes()) {
                        None => return Err(TemplateError::Unterminated),
                        Some(end) => {
                            chunks.push(Chunk::Expr(body[..end].trim().to_owned()));
                            rest = &body[end + 1..];
                        }
                    }
                }
            }
        }
    }

    /// The compiled chunks, in source order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }
}

/// Find the byte offset of the next `${` in `input`.
fn find_expr_start(input: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut point = 0;

    while let Some(i) = memchr(b'$', &bytes[point..]) {
        let at = point + i;
        if bytes.get(at + 1) == Some(&b'{') {
            return Some(at);
        }
        point = at + 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use cool_asserts::assert_matches;

    #[test]
    fn plain_text() {
        let template = Template::compile("hello world").unwrap();
        assert_eq!(template.chunks(), [Chunk::Text("hello world".to_owned())]);
    }

    #[test]
    fn empty() {
        let template = Template::compile("").unwrap();
        assert!(template.chunks().is_empty());
    }

    #[test]
    fn single_expression() {
        let template = Template::compile("Hello ${player.name}!").unwrap();
        assert_eq!(
            template.chunks(),
            [
                Chunk::Text("Hello ".to_owned()),
                Chunk::Expr("player.name".to_owned()),
                Chunk::Text("!".to_owned()),
            ]
        );
    }

    #[test]
    fn adjacent_expressions() {
        let template = Template::compile("${a}${b}").unwrap();
        assert_eq!(
            template.chunks(),
            [Chunk::Expr("a".to_owned()), Chunk::Expr("b".to_owned())]
        );
    }

    #[test]
    fn bare_dollar_is_text() {
        let template = Template::compile("cost: $5").unwrap();
        assert_eq!(template.chunks(), [Chunk::Text("cost: $5".to_owned())]);
    }

    #[test]
    fn expression_is_trimmed() {
        let template = Template::compile("${ card.title }").unwrap();
        assert_eq!(template.chunks(), [Chunk::Expr("card.title".to_owned())]);
    }

    #[test]
    fn unterminated() {
        assert_matches!(
            Template::compile("oops ${broken"),
            Err(TemplateError::Unterminated)
        );
    }
}
