use bitflags::bitflags;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::comment::{Comment, Size};

/// Minimum run of one repeated character that counts as a "repeated characters" comment.
const REPEATED_RUN: usize = 10;

/// How a muted keyword is compared against a comment's text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Partial,
    Forward,
    Backward,
    Exact,
    Regex,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutedKeyword {
    pub pattern: String,
    #[serde(rename = "match")]
    pub match_mode: MatchMode,
}

impl MutedKeyword {
    pub fn new(pattern: impl Into<String>, match_mode: MatchMode) -> Self {
        Self {
            pattern: pattern.into(),
            match_mode,
        }
    }
}

bitflags! {
    /// Attribute-based mute switches, independent of the keyword list.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MuteFlags: u32 {
        /// Comments pinned to the top or bottom of the screen.
        const FIXED_POSITION      = 1 << 0;
        const BIG_SIZE            = 1 << 1;
        /// Anything not drawn in the default white.
        const COLORED             = 1 << 2;
        const REPEATED_CHARACTERS = 1 << 3;
    }
}

/// The persisted mute state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuteSettings {
    pub keywords: Vec<MutedKeyword>,
    pub user_ids: Vec<String>,
    pub flags: MuteFlags,
}

impl MuteSettings {
    /// Copy suitable for persistence: keywords still being edited (empty) are left out.
    pub fn persistable(&self) -> Self {
        Self {
            keywords: self
                .keywords
                .iter()
                .filter(|k| !k.pattern.is_empty())
                .cloned()
                .collect(),
            user_ids: self
                .user_ids
                .iter()
                .filter(|id| !id.is_empty())
                .cloned()
                .collect(),
            flags: self.flags,
        }
    }
}

/// Keyword with its regex compiled once, when the mode calls for it.
#[derive(Debug)]
struct CompiledKeyword {
    keyword: MutedKeyword,
    /// `None` for non-regex modes and for patterns that failed to compile.
    regex: Option<Regex>,
}

impl CompiledKeyword {
    fn compile(keyword: MutedKeyword) -> Self {
        let regex = match keyword.match_mode {
            MatchMode::Regex if !keyword.pattern.is_empty() => match Regex::new(&keyword.pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    debug!(pattern = %keyword.pattern, error = %e, "invalid mute regex, ignoring");
                    None
                }
            },
            _ => None,
        };
        Self { keyword, regex }
    }

    fn matches(&self, text: &str) -> bool {
        let pattern = self.keyword.pattern.as_str();
        if pattern.is_empty() {
            return false;
        }
        match self.keyword.match_mode {
            MatchMode::Partial => text.contains(pattern),
            MatchMode::Forward => text.starts_with(pattern),
            MatchMode::Backward => text.ends_with(pattern),
            MatchMode::Exact => text == pattern,
            MatchMode::Regex => self.regex.as_ref().is_some_and(|re| re.is_match(text)),
        }
    }
}

/// Decides whether a comment may ever reach the display.
#[derive(Debug, Default)]
pub struct MuteFilter {
    keywords: Vec<CompiledKeyword>,
    user_ids: Vec<String>,
    flags: MuteFlags,
}

impl MuteFilter {
    pub fn new(settings: MuteSettings) -> Self {
        let mut filter = Self::default();
        filter.replace(settings);
        filter
    }

    /// Swap in a freshly loaded mute state.
    pub fn replace(&mut self, settings: MuteSettings) {
        self.keywords = settings
            .keywords
            .into_iter()
            .map(CompiledKeyword::compile)
            .collect();
        self.user_ids = settings.user_ids;
        self.flags = settings.flags;
    }

    pub fn settings(&self) -> MuteSettings {
        MuteSettings {
            keywords: self.keywords.iter().map(|k| k.keyword.clone()).collect(),
            user_ids: self.user_ids.clone(),
            flags: self.flags,
        }
    }

    pub fn is_muted(&self, comment: &Comment) -> bool {
        if let Some(user_id) = &comment.user_id
            && self.user_ids.iter().any(|id| id == user_id)
        {
            return true;
        }

        if self.keywords.iter().any(|k| k.matches(&comment.text)) {
            return true;
        }

        self.muted_by_flags(comment)
    }

    fn muted_by_flags(&self, comment: &Comment) -> bool {
        let flags = self.flags;
        (flags.contains(MuteFlags::FIXED_POSITION) && comment.style.position.is_fixed())
            || (flags.contains(MuteFlags::BIG_SIZE) && comment.style.size == Size::Big)
            || (flags.contains(MuteFlags::COLORED) && comment.style.is_colored())
            || (flags.contains(MuteFlags::REPEATED_CHARACTERS)
                && has_repeated_run(&comment.text, REPEATED_RUN))
    }

    /// Add a keyword. Returns false if an identical keyword is already muted.
    pub fn add_keyword(&mut self, keyword: MutedKeyword) -> bool {
        if self.keywords.iter().any(|k| k.keyword == keyword) {
            return false;
        }
        self.keywords.push(CompiledKeyword::compile(keyword));
        true
    }

    /// Replace the keyword at `index`. Returns false if the index is out of range.
    pub fn edit_keyword(&mut self, index: usize, keyword: MutedKeyword) -> bool {
        match self.keywords.get_mut(index) {
            Some(slot) => {
                *slot = CompiledKeyword::compile(keyword);
                true
            }
            None => false,
        }
    }

    pub fn remove_keyword(&mut self, index: usize) -> Option<MutedKeyword> {
        if index < self.keywords.len() {
            Some(self.keywords.remove(index).keyword)
        } else {
            None
        }
    }

    /// Add an author to the block-list. Returns false if already present or empty.
    pub fn add_user_id(&mut self, user_id: impl Into<String>) -> bool {
        let user_id = user_id.into();
        if user_id.is_empty() || self.user_ids.contains(&user_id) {
            return false;
        }
        self.user_ids.push(user_id);
        true
    }

    pub fn remove_user_id(&mut self, user_id: &str) -> bool {
        let before = self.user_ids.len();
        self.user_ids.retain(|id| id != user_id);
        self.user_ids.len() != before
    }

    /// Block the author of `comment`. Anonymous comments can't be muted this way.
    pub fn mute_author_of(&mut self, comment: &Comment) -> bool {
        match &comment.user_id {
            Some(user_id) => self.add_user_id(user_id.clone()),
            None => false,
        }
    }

    pub fn set_flags(&mut self, flags: MuteFlags) {
        self.flags = flags;
    }

    pub fn flags(&self) -> MuteFlags {
        self.flags
    }
}

fn has_repeated_run(text: &str, run: usize) -> bool {
    let mut prev = None;
    let mut count = 0;
    for c in text.chars() {
        if Some(c) == prev {
            count += 1;
        } else {
            prev = Some(c);
            count = 1;
        }
        if count >= run {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::comment::{CommentStyle, Position};

    fn comment(text: &str) -> Comment {
        Comment::new(text, "00:00:00", Some("user-1".into()))
    }

    fn filter_with(pattern: &str, mode: MatchMode) -> MuteFilter {
        let mut filter = MuteFilter::default();
        filter.add_keyword(MutedKeyword::new(pattern, mode));
        filter
    }

    #[test]
    fn test_partial_vs_exact() {
        let c = comment("this is spam content");
        assert!(filter_with("spam", MatchMode::Partial).is_muted(&c));
        assert!(!filter_with("spam", MatchMode::Exact).is_muted(&c));
        assert!(filter_with("this is spam content", MatchMode::Exact).is_muted(&c));
    }

    #[test]
    fn test_forward_and_backward() {
        let c = comment("wwww lol");
        assert!(filter_with("www", MatchMode::Forward).is_muted(&c));
        assert!(!filter_with("lol", MatchMode::Forward).is_muted(&c));
        assert!(filter_with("lol", MatchMode::Backward).is_muted(&c));
        assert!(!filter_with("www", MatchMode::Backward).is_muted(&c));
    }

    #[test]
    fn test_regex_match() {
        let filter = filter_with(r"^\d{3,}$", MatchMode::Regex);
        assert!(filter.is_muted(&comment("8888")));
        assert!(!filter.is_muted(&comment("88 is a number")));
    }

    #[test]
    fn test_invalid_regex_fails_open() {
        let filter = filter_with("(unclosed", MatchMode::Regex);
        assert!(!filter.is_muted(&comment("(unclosed")));
        assert!(!filter.is_muted(&comment("anything")));
    }

    #[test]
    fn test_empty_pattern_never_matches() {
        let filter = filter_with("", MatchMode::Partial);
        assert!(!filter.is_muted(&comment("hello")));
    }

    #[test]
    fn test_user_id_exact_match() {
        let mut filter = MuteFilter::default();
        filter.add_user_id("user-1");
        assert!(filter.is_muted(&comment("hello")));
        assert!(!filter.is_muted(&Comment::new("hello", "00:00:00", Some("user-10".into()))));
        assert!(!filter.is_muted(&Comment::new("hello", "00:00:00", None)));
    }

    #[test]
    fn test_adding_twice_is_idempotent() {
        let mut filter = MuteFilter::default();
        assert!(filter.add_keyword(MutedKeyword::new("spam", MatchMode::Partial)));
        assert!(!filter.add_keyword(MutedKeyword::new("spam", MatchMode::Partial)));
        assert_eq!(filter.settings().keywords.len(), 1);

        assert!(filter.add_user_id("u"));
        assert!(!filter.add_user_id("u"));
        assert_eq!(filter.settings().user_ids.len(), 1);

        filter.remove_keyword(0);
        assert!(!filter.is_muted(&comment("spam")));
    }

    #[test]
    fn test_edit_keyword_recompiles() {
        let mut filter = filter_with("abc", MatchMode::Partial);
        assert!(filter.edit_keyword(0, MutedKeyword::new("^x+$", MatchMode::Regex)));
        assert!(!filter.is_muted(&comment("abc")));
        assert!(filter.is_muted(&comment("xxx")));
        assert!(!filter.edit_keyword(5, MutedKeyword::new("y", MatchMode::Exact)));
    }

    #[test]
    fn test_mute_author_of() {
        let mut filter = MuteFilter::default();
        assert!(!filter.mute_author_of(&Comment::new("anon", "00:00:00", None)));
        assert!(filter.mute_author_of(&comment("hi")));
        assert!(filter.is_muted(&comment("different text")));
    }

    #[test]
    fn test_flags() {
        let mut filter = MuteFilter::default();
        let fixed = comment("top").with_style(CommentStyle {
            position: Position::Top,
            ..CommentStyle::default()
        });
        let red = comment("red").with_style(CommentStyle {
            color: "#FF0000".into(),
            ..CommentStyle::default()
        });
        let repeated = comment("wwwwwwwwwwww");

        assert!(!filter.is_muted(&fixed));
        assert!(!filter.is_muted(&red));
        assert!(!filter.is_muted(&repeated));

        filter.set_flags(MuteFlags::FIXED_POSITION | MuteFlags::COLORED | MuteFlags::REPEATED_CHARACTERS);
        assert!(filter.is_muted(&fixed));
        assert!(filter.is_muted(&red));
        assert!(filter.is_muted(&repeated));
        assert!(!filter.is_muted(&comment("www")));
    }

    #[test]
    fn test_persistable_drops_empty_patterns() {
        let mut filter = MuteFilter::default();
        filter.add_keyword(MutedKeyword::new("", MatchMode::Partial));
        filter.add_keyword(MutedKeyword::new("ok", MatchMode::Exact));
        let saved = filter.settings().persistable();
        assert_eq!(saved.keywords, vec![MutedKeyword::new("ok", MatchMode::Exact)]);
    }

    #[test]
    fn test_settings_json_shape() {
        let settings = MuteSettings {
            keywords: vec![MutedKeyword::new("spam", MatchMode::Backward)],
            user_ids: vec!["abc".into()],
            flags: MuteFlags::BIG_SIZE,
        };
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["keywords"][0]["match"], "backward");
        let back: MuteSettings = serde_json::from_value(json).unwrap();
        assert_eq!(back, settings);
    }
}
