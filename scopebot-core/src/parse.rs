// ABOUTME: Quote-aware tokenizer for command text
// ABOUTME: Keeps byte offsets so raw argument text can be recovered after matching

/// One whitespace-separated token; quoted runs are a single token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    /// Byte offset in the input where the token (or its opening quote) starts
    pub start: usize,
}

/// Tokenized command text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens<'a> {
    input: &'a str,
    tokens: Vec<Token>,
}

impl<'a> Tokens<'a> {
    pub fn parse(input: &'a str) -> Self {
        Self {
            input,
            tokens: tokenize(input),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(|t| t.text.as_str())
    }

    /// Token texts from `index` on
    pub fn rest(&self, index: usize) -> Vec<String> {
        self.tokens
            .iter()
            .skip(index)
            .map(|t| t.text.clone())
            .collect()
    }

    /// Untouched input text from token `index` on, trimmed
    pub fn raw_from(&self, index: usize) -> &'a str {
        match self.tokens.get(index) {
            Some(token) => self.input[token.start..].trim(),
            None => "",
        }
    }
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut start: Option<usize> = None;
    let mut quote: Option<char> = None;

    for (i, c) in input.char_indices() {
        match (quote, c) {
            // Quotes only open at the start of a token, so `O'Brien` stays whole
            (None, '"' | '\'') if start.is_none() => {
                quote = Some(c);
                start.get_or_insert(i);
            }
            (Some(q), c) if c == q => {
                quote = None;
                // Consecutive quotes do not produce empty tokens
                if !current.is_empty() {
                    if let Some(s) = start.take() {
                        tokens.push(Token {
                            text: std::mem::take(&mut current),
                            start: s,
                        });
                    }
                }
                start = None;
            }
            (None, c) if c.is_whitespace() => {
                if let Some(s) = start.take() {
                    if !current.is_empty() {
                        tokens.push(Token {
                            text: std::mem::take(&mut current),
                            start: s,
                        });
                    }
                }
            }
            _ => {
                start.get_or_insert(i);
                current.push(c);
            }
        }
    }

    if let Some(s) = start {
        if !current.is_empty() {
            tokens.push(Token {
                text: current,
                start: s,
            });
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(input: &str) -> Vec<String> {
        Tokens::parse(input).rest(0)
    }

    #[test]
    fn test_simple_split() {
        assert_eq!(texts("nick set bob"), vec!["nick", "set", "bob"]);
    }

    #[test]
    fn test_extra_whitespace() {
        assert_eq!(texts("  id \t place   "), vec!["id", "place"]);
    }

    #[test]
    fn test_double_quotes_group() {
        assert_eq!(
            texts(r#"nick set "Big Bob" now"#),
            vec!["nick", "set", "Big Bob", "now"]
        );
    }

    #[test]
    fn test_single_quotes_group() {
        assert_eq!(texts("say 'hello world'"), vec!["say", "hello world"]);
    }

    #[test]
    fn test_apostrophe_inside_word_is_literal() {
        assert_eq!(texts("nick set O'Brien"), vec!["nick", "set", "O'Brien"]);
        assert_eq!(texts("don't stop"), vec!["don't", "stop"]);
        assert_eq!(
            texts(r#"say it's "very good""#),
            vec!["say", "it's", "very good"]
        );
    }

    #[test]
    fn test_empty_quotes_dropped() {
        assert_eq!(texts(r#"a "" b"#), vec!["a", "b"]);
    }

    #[test]
    fn test_unclosed_quote_keeps_rest() {
        assert_eq!(texts(r#"say "oops here"#), vec!["say", "oops here"]);
    }

    #[test]
    fn test_raw_from_keeps_original_text() {
        let tokens = Tokens::parse(r#"nick set  "Big   Bob"  "#);
        assert_eq!(tokens.raw_from(2), r#""Big   Bob""#);
        assert_eq!(tokens.raw_from(1), r#"set  "Big   Bob""#);
        assert_eq!(tokens.raw_from(3), "");
    }

    #[test]
    fn test_empty_input() {
        let tokens = Tokens::parse("   ");
        assert!(tokens.is_empty());
        assert_eq!(tokens.get(0), None);
    }
}
