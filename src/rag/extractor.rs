//! Pulls documentation text out of page modules.
//!
//! Pages carry their prose in a `content` constant, written either as a
//! template literal or as a one-line quoted string.

use regex::Regex;

use super::scanner::DocumentRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    pub source_path: String,
    pub text: String,
}

/// A match of one literal form: byte offset in the source plus decoded text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recognized {
    pub offset: usize,
    pub text: String,
}

pub trait Recognizer: Send + Sync {
    fn name(&self) -> &'static str;
    fn find_all(&self, source: &str) -> Vec<Recognized>;
}

const DECLARATION: &str = r"(?:\bexport\s+)?\bconst\s+content\s*(?::\s*string\s*)?=\s*";

struct LiteralRecognizer {
    name: &'static str,
    pattern: Regex,
    escapes: &'static [char],
}

impl LiteralRecognizer {
    fn new(name: &'static str, body: &str, escapes: &'static [char]) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            pattern: Regex::new(&format!("{}{}", DECLARATION, body))?,
            escapes,
        })
    }
}

impl Recognizer for LiteralRecognizer {
    fn name(&self) -> &'static str {
        self.name
    }

    fn find_all(&self, source: &str) -> Vec<Recognized> {
        self.pattern
            .captures_iter(source)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let inner = caps.get(1)?;
                Some(Recognized {
                    offset: whole.start(),
                    text: unescape(inner.as_str(), self.escapes),
                })
            })
            .collect()
    }
}

/// Resolves `\x` to `x` for the listed characters; other escapes are kept
/// verbatim.
fn unescape(raw: &str, escapes: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(next) if escapes.contains(&next) => out.push(next),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    out
}

pub struct ContentExtractor {
    recognizers: Vec<Box<dyn Recognizer>>,
}

impl ContentExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        let template = LiteralRecognizer::new(
            "template",
            r"(?s)`((?:\\.|[^`\\])*)`\s*;?",
            &['`', '\\', '$'],
        )?;
        let single = LiteralRecognizer::new(
            "single-quoted",
            r"'((?:\\[^\n]|[^'\\\n])*)'\s*;?",
            &['\'', '\\'],
        )?;
        let double = LiteralRecognizer::new(
            "double-quoted",
            r#""((?:\\[^\n]|[^"\\\n])*)"\s*;?"#,
            &['"', '\\'],
        )?;

        Ok(Self {
            recognizers: vec![Box::new(template), Box::new(single), Box::new(double)],
        })
    }

    pub fn with_recognizers(recognizers: Vec<Box<dyn Recognizer>>) -> Self {
        Self { recognizers }
    }

    /// Every recognized block in source order. Zero matches is not an error.
    pub fn extract(&self, raw_text: &str) -> Vec<String> {
        let mut found: Vec<Recognized> = self
            .recognizers
            .iter()
            .flat_map(|r| {
                let matches = r.find_all(raw_text);
                if !matches.is_empty() {
                    tracing::trace!("{} recognizer matched {} block(s)", r.name(), matches.len());
                }
                matches
            })
            .collect();
        found.sort_by_key(|m| m.offset);
        found.into_iter().map(|m| m.text).collect()
    }

    pub fn extract_document(&self, document: &DocumentRecord) -> Vec<ContentBlock> {
        self.extract(&document.raw_text)
            .into_iter()
            .map(|text| ContentBlock {
                source_path: document.path.clone(),
                text,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> ContentExtractor {
        ContentExtractor::new().expect("patterns compile")
    }

    #[test]
    fn template_literal_spans_lines() {
        let src = "import x from 'y';\nexport const content = `# Intro\n\nLine two`;\n";
        assert_eq!(extractor().extract(src), vec!["# Intro\n\nLine two".to_string()]);
    }

    #[test]
    fn escaped_delimiters_are_unescaped() {
        let src = r"const content = `run \`npm i\` then cost \${price} in C:\\dir\\`;";
        assert_eq!(
            extractor().extract(src),
            vec![r"run `npm i` then cost ${price} in C:\dir\".to_string()]
        );
    }

    #[test]
    fn escaped_backslash_does_not_swallow_closing_delimiter() {
        let src = "const content = `ends with \\\\`;\nconst other = `not content`;";
        assert_eq!(extractor().extract(src), vec!["ends with \\".to_string()]);
    }

    #[test]
    fn quoted_forms_are_single_line() {
        let src = "export const content = 'It\\'s short';\nconst content = \"say \\\"hi\\\"\";";
        assert_eq!(
            extractor().extract(src),
            vec!["It's short".to_string(), "say \"hi\"".to_string()]
        );

        let broken = "const content = 'line one\nline two';";
        assert!(extractor().extract(broken).is_empty());
    }

    #[test]
    fn blocks_are_returned_in_source_order() {
        let src = "const content = \"first\";\nconst content = `second`;\nconst content = 'third';";
        assert_eq!(
            extractor().extract(src),
            vec!["first".to_string(), "second".to_string(), "third".to_string()]
        );
    }

    #[test]
    fn other_identifiers_and_missing_literals_yield_nothing() {
        assert!(extractor().extract("const contents = `x`;").is_empty());
        assert!(extractor().extract("myconst content = `x`;").is_empty());
        assert!(extractor().extract("export default function Page() {}").is_empty());
    }

    #[test]
    fn typed_declaration_is_recognized() {
        let src = "export const content: string = `typed`";
        assert_eq!(extractor().extract(src), vec!["typed".to_string()]);
    }

    #[test]
    fn document_blocks_keep_source_path() {
        let doc = DocumentRecord::new("app/a/page.tsx", "const content = `x`;");
        let blocks = extractor().extract_document(&doc);
        assert_eq!(blocks[0].source_path, "app/a/page.tsx");
    }
}
