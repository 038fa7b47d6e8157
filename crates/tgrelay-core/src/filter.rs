/// Keyword-based content filter for source messages.
///
/// A message is blocked when any keyword occurs as a substring of its
/// lowercased text. Keywords are lowercased once on construction.
#[derive(Clone, Debug, Default)]
pub struct KeywordFilter {
    keywords: Vec<String>,
}

impl KeywordFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// `true` when the text may be relayed. Absent or empty text always passes.
    pub fn passes(&self, text: Option<&str>) -> bool {
        self.first_match(text).is_none()
    }

    /// The first keyword (in configured order) found in `text`.
    pub fn first_match(&self, text: Option<&str>) -> Option<&str> {
        let text = text?.to_lowercase();
        if text.is_empty() {
            return None;
        }
        self.keywords
            .iter()
            .find(|kw| text.contains(kw.as_str()))
            .map(String::as_str)
    }
}
