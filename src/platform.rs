use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Os {
    MacOs,
    Linux,
    Windows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arch {
    X86_64,
    Aarch64,
    Arm,
}

/// A release target such as `macos-x86_64` or `linux-x86_64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

const OS_ALIASES: &[(Os, &[&str])] = &[
    (Os::MacOs, &["macos", "darwin", "mac", "osx", "apple-darwin"]),
    (Os::Linux, &["linux", "unknown-linux", "pc-linux"]),
    (Os::Windows, &["windows", "win", "win32", "pc-windows"]),
];

const ARCH_ALIASES: &[(Arch, &[&str])] = &[
    (Arch::X86_64, &["x86_64", "amd64", "x64"]),
    (Arch::Aarch64, &["aarch64", "arm64"]),
    (Arch::Arm, &["arm", "armv7"]),
];

impl Os {
    pub fn as_str(&self) -> &'static str {
        match self {
            Os::MacOs => "macos",
            Os::Linux => "linux",
            Os::Windows => "windows",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        OS_ALIASES
            .iter()
            .find(|(_, aliases)| aliases.contains(&s))
            .map(|(os, _)| *os)
    }
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
            Arch::Arm => "arm",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        ARCH_ALIASES
            .iter()
            .find(|(_, aliases)| aliases.contains(&s))
            .map(|(arch, _)| *arch)
    }
}

impl Platform {
    pub fn new(os: Os, arch: Arch) -> Self {
        Platform { os, arch }
    }

    /// The platform this binary was compiled for.
    pub fn current() -> Option<Self> {
        let os = Os::parse(std::env::consts::OS)?;
        let arch = Arch::parse(std::env::consts::ARCH)?;
        Some(Platform { os, arch })
    }

    pub fn executable_suffix(&self) -> &'static str {
        match self.os {
            Os::Windows => ".exe",
            _ => "",
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    /// Accepts `macos-x86_64`, `macOS x86_64`, `darwin/amd64`, `linux_arm64`
    /// and similar spellings. The arch is the last separated word; the OS is
    /// everything before it.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let normalized: String = lower
            .chars()
            .map(|c| if matches!(c, ' ' | '_' | '/') { '-' } else { c })
            .collect();

        // x86_64 contains the separator we just rewrote, so match arch suffixes
        // against the normalized form first.
        let (os_part, arch) = ARCH_ALIASES
            .iter()
            .flat_map(|(arch, aliases)| aliases.iter().map(move |a| (*arch, a.replace('_', "-"))))
            .find_map(|(arch, alias)| {
                normalized
                    .strip_suffix(alias.as_str())
                    .and_then(|rest| rest.strip_suffix('-'))
                    .map(|rest| (rest.to_string(), arch))
            })
            .ok_or_else(|| format!("unknown platform '{}': missing or unknown architecture", s))?;

        let os = Os::parse(&os_part).ok_or_else(|| {
            format!(
                "unknown platform '{}': unknown operating system '{}'",
                s, os_part
            )
        })?;

        Ok(Platform { os, arch })
    }
}

impl TryFrom<String> for Platform {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Platform> for String {
    fn from(value: Platform) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_round_trip() {
        for id in ["macos-x86_64", "linux-x86_64", "linux-aarch64", "windows-x86_64"] {
            let p: Platform = id.parse().unwrap();
            assert_eq!(p.to_string(), id);
        }
    }

    #[test]
    fn test_aliases_normalize() {
        let mac = Platform::new(Os::MacOs, Arch::X86_64);
        assert_eq!("macOS x86_64".parse::<Platform>().unwrap(), mac);
        assert_eq!("darwin-amd64".parse::<Platform>().unwrap(), mac);
        assert_eq!("osx/x64".parse::<Platform>().unwrap(), mac);
        assert_eq!(
            "Linux_arm64".parse::<Platform>().unwrap(),
            Platform::new(Os::Linux, Arch::Aarch64)
        );
        assert_eq!(
            "Linux x86_64".parse::<Platform>().unwrap(),
            Platform::new(Os::Linux, Arch::X86_64)
        );
    }

    #[test]
    fn test_rejects_unknown() {
        assert!("plan9-x86_64".parse::<Platform>().is_err());
        assert!("linux".parse::<Platform>().is_err());
        assert!("linux-sparc".parse::<Platform>().is_err());
        assert!("".parse::<Platform>().is_err());
    }

    #[test]
    fn test_current_platform_is_known_on_ci_hosts() {
        if cfg!(any(target_os = "linux", target_os = "macos")) {
            let p = Platform::current().expect("host platform");
            assert!(!p.to_string().is_empty());
        }
    }
}
