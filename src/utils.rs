/// Backslash-escape a value placed inside a quoted-string digest parameter
pub trait QuoteForDigest {
    fn quote_for_digest(&self) -> String;
}

impl QuoteForDigest for str {
    fn quote_for_digest(&self) -> String {
        if !self.contains(['\\', '"']) {
            return self.to_owned();
        }
        self.replace('\\', "\\\\").replace('"', "\\\"")
    }
}
