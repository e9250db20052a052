#![forbid(unsafe_code)]

use std::fmt;

const MIN_ID_DIGITS: usize = 4;

/// Closed set of record kinds that receive sequence-allocated identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Epic,
    Story,
    Task,
    Plan,
}

impl EntityKind {
    /// Resolution order inside a batch: later kinds may reference earlier ones by key.
    pub const RECORDS: [EntityKind; 3] = [EntityKind::Epic, EntityKind::Story, EntityKind::Task];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Story => "story",
            Self::Task => "task",
            Self::Plan => "plan",
        }
    }

    /// Plural form used for directory names, batch sections and sequence counters.
    pub fn plural(self) -> &'static str {
        match self {
            Self::Epic => "epics",
            Self::Story => "stories",
            Self::Task => "tasks",
            Self::Plan => "plans",
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Epic => "EP",
            Self::Story => "ST",
            Self::Task => "TK",
            Self::Plan => "PLAN",
        }
    }

    /// Extension of the file a record of this kind is stored in.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Plan => "yaml",
            _ => "json",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent identifier of the form `<PREFIX>-<number>`, number zero-padded to 4+ digits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    kind: EntityKind,
    value: String,
}

impl EntityId {
    pub fn format(kind: EntityKind, number: u64) -> Self {
        Self {
            kind,
            value: format!(
                "{}-{number:0width$}",
                kind.prefix(),
                width = MIN_ID_DIGITS
            ),
        }
    }

    pub fn try_new(kind: EntityKind, value: impl Into<String>) -> Result<Self, EntityIdError> {
        let value = value.into();
        validate_entity_id(kind, &value)?;
        Ok(Self { kind, value })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }

    /// Like [`EntityId::try_new`], but also accepts the unhyphenated form
    /// (`EP0001`) and returns it in canonical form.
    pub fn normalize(kind: EntityKind, value: &str) -> Result<Self, EntityIdError> {
        let err = match Self::try_new(kind, value) {
            Ok(id) => return Ok(id),
            Err(err) => err,
        };
        match value.strip_prefix(kind.prefix()) {
            Some(digits)
                if digits.len() >= MIN_ID_DIGITS && digits.bytes().all(|b| b.is_ascii_digit()) =>
            {
                Ok(Self {
                    kind,
                    value: format!("{}-{digits}", kind.prefix()),
                })
            }
            _ => Err(err),
        }
    }

    /// Numeric part of the identifier.
    pub fn number(&self) -> u64 {
        self.value[self.kind.prefix().len() + 1..]
            .parse()
            .unwrap_or_default()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityIdError {
    Empty,
    WrongPrefix { expected: &'static str },
    TooFewDigits,
    InvalidDigit { ch: char, index: usize },
}

impl EntityIdError {
    pub fn message(&self) -> String {
        match self {
            Self::Empty => "id must not be empty".to_string(),
            Self::WrongPrefix { expected } => format!("id must start with `{expected}-`"),
            Self::TooFewDigits => format!("id must carry at least {MIN_ID_DIGITS} digits"),
            Self::InvalidDigit { ch, index } => {
                format!("id contains non-digit {ch:?} at position {index}")
            }
        }
    }
}

impl fmt::Display for EntityIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for EntityIdError {}

fn validate_entity_id(kind: EntityKind, value: &str) -> Result<(), EntityIdError> {
    if value.is_empty() {
        return Err(EntityIdError::Empty);
    }
    let prefix = kind.prefix();
    let Some(digits) = value
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
    else {
        return Err(EntityIdError::WrongPrefix { expected: prefix });
    };
    if let Some((index, ch)) = digits.char_indices().find(|(_, ch)| !ch.is_ascii_digit()) {
        return Err(EntityIdError::InvalidDigit {
            ch,
            index: prefix.len() + 1 + index,
        });
    }
    if digits.len() < MIN_ID_DIGITS {
        return Err(EntityIdError::TooFewDigits);
    }
    Ok(())
}

/// Owner side of a prompt file: `<STORY|TASK>-<ownerID>.md`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PromptOwner {
    Story,
    Task,
}

impl PromptOwner {
    pub fn kind(self) -> EntityKind {
        match self {
            Self::Story => EntityKind::Story,
            Self::Task => EntityKind::Task,
        }
    }

    pub fn for_kind(kind: EntityKind) -> Option<Self> {
        match kind {
            EntityKind::Story => Some(Self::Story),
            EntityKind::Task => Some(Self::Task),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Story => "STORY",
            Self::Task => "TASK",
        }
    }

    pub fn file_name(self, owner_id: &str) -> String {
        format!("{}-{owner_id}.md", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_pads_to_four_digits() {
        assert_eq!(EntityId::format(EntityKind::Epic, 1).as_str(), "EP-0001");
        assert_eq!(EntityId::format(EntityKind::Plan, 42).as_str(), "PLAN-0042");
        assert_eq!(EntityId::format(EntityKind::Task, 12345).as_str(), "TK-12345");
    }

    #[test]
    fn entity_id_validation() {
        assert_eq!(
            EntityId::try_new(EntityKind::Story, "").unwrap_err(),
            EntityIdError::Empty
        );
        assert_eq!(
            EntityId::try_new(EntityKind::Story, "EP-0001").unwrap_err(),
            EntityIdError::WrongPrefix { expected: "ST" }
        );
        assert_eq!(
            EntityId::try_new(EntityKind::Story, "ST0001").unwrap_err(),
            EntityIdError::WrongPrefix { expected: "ST" }
        );
        assert_eq!(
            EntityId::try_new(EntityKind::Story, "ST-001").unwrap_err(),
            EntityIdError::TooFewDigits
        );
        assert_eq!(
            EntityId::try_new(EntityKind::Story, "ST-00a1").unwrap_err(),
            EntityIdError::InvalidDigit { ch: 'a', index: 5 }
        );
        let id = EntityId::try_new(EntityKind::Story, "ST-0007").expect("valid id");
        assert_eq!(id.number(), 7);
        assert!(EntityId::try_new(EntityKind::Epic, "myKey").is_err());
    }

    #[test]
    fn unhyphenated_ids_normalize_to_canonical_form() {
        let id = EntityId::normalize(EntityKind::Epic, "EP0007").expect("legacy id");
        assert_eq!(id.as_str(), "EP-0007");
        assert_eq!(id.number(), 7);
        assert_eq!(
            EntityId::normalize(EntityKind::Epic, "EP-0007")
                .expect("canonical id")
                .as_str(),
            "EP-0007"
        );
        assert_eq!(
            EntityId::normalize(EntityKind::Story, "ST001").unwrap_err(),
            EntityIdError::WrongPrefix { expected: "ST" }
        );
        assert!(EntityId::normalize(EntityKind::Story, "EP0001").is_err());
        assert!(EntityId::normalize(EntityKind::Story, "../x").is_err());
    }

    #[test]
    fn prompt_file_names() {
        assert_eq!(PromptOwner::Story.file_name("ST-0001"), "STORY-ST-0001.md");
        assert_eq!(PromptOwner::for_kind(EntityKind::Epic), None);
        assert_eq!(PromptOwner::Task.kind(), EntityKind::Task);
    }
}
