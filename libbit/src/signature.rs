use crate::error::{BitGenericError, BitResult};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

#[derive(PartialEq, Clone, Debug, Hash, Ord, PartialOrd, Eq, Copy)]
pub struct BitEpochTime(i64);

impl BitEpochTime {
    pub fn new(i: i64) -> Self {
        Self(i)
    }
}

#[derive(PartialEq, Clone, Debug, Hash, Ord, PartialOrd, Eq, Copy)]
/// timezone offset in minutes
pub struct BitTimeZoneOffset(i32);

impl BitTimeZoneOffset {
    pub fn new(offset: i32) -> Self {
        Self(offset)
    }
}

#[derive(PartialEq, Clone, Debug, PartialOrd, Eq, Ord, Hash)]
pub struct BitTime {
    pub(crate) time: BitEpochTime,
    pub(crate) offset: BitTimeZoneOffset,
}

impl BitTime {
    pub fn now() -> Self {
        // for testing we always have some fixed time so each run is deterministic
        // (reflog entries compare equal across runs)
        if cfg!(test) {
            Self { time: BitEpochTime(0), offset: BitTimeZoneOffset(0) }
        } else {
            let now = chrono::offset::Local::now();
            let offset = BitTimeZoneOffset(now.offset().local_minus_utc() / 60);
            let time = BitEpochTime(now.timestamp());
            Self { time, offset }
        }
    }
}

#[derive(PartialEq, Clone, Debug)]
pub struct BitSignature {
    pub name: String,
    pub email: String,
    pub time: BitTime,
}

impl BitSignature {
    /// the identity (name, email) is a caller-supplied fact about who's performing
    /// the write, not something the store reads out of a config file.
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> BitResult<Self> {
        let name = name.into();
        let email = email.into();
        ensure!(!name.is_empty(), "signature name must not be empty");
        ensure!(!email.is_empty(), "signature email must not be empty");
        Ok(Self { name, email, time: BitTime::now() })
    }

    /// identity for writes the store makes on its own behalf (e.g. reflog entries
    /// recorded by a ref update), falling back to the same `GIT_COMMITTER_*`
    /// environment variables real git honours when no richer identity is supplied.
    pub fn from_env() -> BitResult<Self> {
        let name = std::env::var("GIT_COMMITTER_NAME").unwrap_or_else(|_| "unknown".to_owned());
        let email = std::env::var("GIT_COMMITTER_EMAIL")
            .unwrap_or_else(|_| "unknown@localhost".to_owned());
        Self::now(name, email)
    }
}

impl FromStr for BitTimeZoneOffset {
    type Err = BitGenericError;

    // format: (+|-)0200
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ensure!(s.len() == 5, "invalid timezone offset `{}`", s);
        let sign = match &s[0..1] {
            "+" => 1,
            "-" => -1,
            _ => bail!("invalid timezone offset sign in `{}`", s),
        };
        let hours: i32 = s[1..3].parse()?;
        let minutes: i32 = s[3..5].parse()?;
        let offset = sign * (minutes + hours * 60);
        Ok(Self(offset))
    }
}

impl FromStr for BitEpochTime {
    type Err = BitGenericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl FromStr for BitTime {
    type Err = BitGenericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut splits = s.split_ascii_whitespace();
        let time = splits.next().ok_or_else(|| anyhow!("missing timestamp in `{}`", s))?.parse()?;
        let offset =
            splits.next().ok_or_else(|| anyhow!("missing timezone offset in `{}`", s))?.parse()?;
        Ok(Self { time, offset })
    }
}

impl FromStr for BitSignature {
    type Err = BitGenericError;

    // Andy Yu <andyyu2004@gmail.com> 1616061862 +1300
    fn from_str(s: &str) -> BitResult<Self> {
        // assumes no < or > in name
        let email_start_idx = s.find('<').ok_or_else(|| anyhow!("malformed signature `{}`", s))?;
        let email_end_idx = s.find('>').ok_or_else(|| anyhow!("malformed signature `{}`", s))?;

        let name = s[..email_start_idx - 1].to_owned();
        let email = s[email_start_idx + 1..email_end_idx].to_owned();
        let time = s[email_end_idx + 1..].trim_start().parse()?;
        Ok(Self { name, email, time })
    }
}

impl Display for BitEpochTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for BitTimeZoneOffset {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let sign = if self.0 >= 0 { '+' } else { '-' };
        let offset = self.0.abs();
        let hours = offset / 60;
        let minutes = offset % 60;
        write!(f, "{}{:02}{:02}", sign, hours, minutes)?;
        Ok(())
    }
}

impl Display for BitTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.time, self.offset)
    }
}

impl Display for BitSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> {}", self.name, self.email, self.time)
    }
}

#[cfg(test)]
mod tests;
