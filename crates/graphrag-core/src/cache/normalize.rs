//! Query-string normalization applied before hashing/lookup to improve hit
//! rate across paraphrases of the same question.

const FILLER_PHRASES: &[&str] = &["please show me", "can you tell me", "i want to know", "show me"];

/// Case-fold, strip conversational filler, and fold `what`/`which` so that
/// semantically equivalent phrasings normalize to the same string. Entity
/// tokens (anything not matched by the rules above) are preserved verbatim.
pub fn normalize_query(query: &str) -> String {
    let mut normalized = query.to_lowercase();

    for phrase in FILLER_PHRASES {
        normalized = normalized.replace(phrase, "");
    }

    normalized = normalized.replace("which", "what");

    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_filler_and_case_folds() {
        assert_eq!(normalize_query("Please show me What calls Auth?"), "what calls auth?");
    }

    #[test]
    fn folds_which_to_what() {
        assert_eq!(normalize_query("Which services call auth?"), "what services call auth?");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize_query("what   calls    auth"), "what calls auth");
    }
}
