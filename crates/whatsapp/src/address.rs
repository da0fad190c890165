use std::{fmt, str::FromStr};

/// Server suffix for individual users.
pub const USER_SERVER: &str = "s.whatsapp.net";

/// Server suffix for groups.
pub const GROUP_SERVER: &str = "g.us";

/// What kind of chat a bulk-send target names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TargetKind {
    #[default]
    Number,
    Group,
}

impl TargetKind {
    pub fn server(self) -> &'static str {
        match self {
            Self::Number => USER_SERVER,
            Self::Group => GROUP_SERVER,
        }
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "number" => Ok(Self::Number),
            "group" => Ok(Self::Group),
            other => Err(format!("unknown target type '{other}'")),
        }
    }
}

/// A resolved chat address (JID) in `<id>@<server>` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatAddress(String);

impl ChatAddress {
    /// Suffix `target` with the server for `kind`.
    pub fn resolve(target: &str, kind: TargetKind) -> Self {
        Self(format!("{}@{}", target.trim(), kind.server()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_resolves_to_user_server() {
        let addr = ChatAddress::resolve("15550102030", TargetKind::Number);
        assert_eq!(addr.as_str(), "15550102030@s.whatsapp.net");
    }

    #[test]
    fn group_resolves_to_group_server() {
        let addr = ChatAddress::resolve("120363025246125486", TargetKind::Group);
        assert_eq!(addr.as_str(), "120363025246125486@g.us");
    }

    #[test]
    fn target_is_trimmed() {
        let addr = ChatAddress::resolve("  4915112345678 \n", TargetKind::Number);
        assert_eq!(addr.to_string(), "4915112345678@s.whatsapp.net");
    }

    #[test]
    fn parses_target_kind() {
        assert_eq!("group".parse::<TargetKind>().unwrap(), TargetKind::Group);
        assert_eq!(" Number ".parse::<TargetKind>().unwrap(), TargetKind::Number);
        assert!("channel".parse::<TargetKind>().is_err());
        assert_eq!(TargetKind::default(), TargetKind::Number);
    }
}
