//! minimal key-value store backing the handful of `core.*` settings the object/ref
//! stores themselves need to agree on (repository format version, bareness, filemode
//! tracking). full config-file parsing (includes, multi-valued keys, `[section "sub"]`)
//! is a porcelain concern and lives outside this crate.

use crate::error::BitResult;
use crate::repo::RepoCtxt;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub struct BitConfig {
    path: PathBuf,
    sections: BTreeMap<(String, String), String>,
}

/// namespacing wrapper so callers write `repo.config().repositoryformatversion()`
/// rather than reaching into the raw key-value store directly.
pub struct Config<'r, 'rcx> {
    rcx: &'r RepoCtxt<'rcx>,
}

impl<'rcx> RepoCtxt<'rcx> {
    pub fn config(&self) -> Config<'_, 'rcx> {
        Config { rcx: self }
    }

    pub fn with_local_config<R>(&self, f: impl FnOnce(&mut BitConfig) -> BitResult<R>) -> BitResult<R> {
        BitConfig::with_local(self.config_path(), f)
    }
}

fn parse(s: &str) -> BTreeMap<(String, String), String> {
    let mut sections = BTreeMap::new();
    let mut section = String::new();
    for line in s.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            section = line[1..line.len() - 1].trim().to_owned();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            sections.insert((section.clone(), key.trim().to_owned()), value.trim().to_owned());
        }
    }
    sections
}

impl BitConfig {
    pub fn with_local<R>(
        path: impl AsRef<Path>,
        f: impl FnOnce(&mut BitConfig) -> BitResult<R>,
    ) -> BitResult<R> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            File::create(&path)?;
        }
        let contents = std::fs::read_to_string(&path)?;
        let mut config = BitConfig { sections: parse(&contents), path };
        f(&mut config)
    }

    fn write(&self) -> BitResult<()> {
        let mut file = File::create(&self.path)?;
        let mut section = None;
        for ((s, k), v) in &self.sections {
            if Some(s) != section {
                writeln!(file, "[{}]", s)?;
                section = Some(s);
            }
            writeln!(file, "\t{} = {}", k, v)?;
        }
        Ok(())
    }

    pub fn get<T: FromStr>(&self, section: &str, key: &str) -> BitResult<Option<T>>
    where
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.sections
            .get(&(section.to_owned(), key.to_owned()))
            .map(|v| v.parse().map_err(Into::into))
            .transpose()
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl ToString) -> BitResult<()> {
        self.sections.insert((section.to_owned(), key.to_owned()), value.to_string());
        self.write()
    }

    pub fn repositoryformatversion(&self) -> BitResult<Option<i64>> {
        self.get("core", "repositoryformatversion")
    }

    pub fn bare(&self) -> BitResult<Option<bool>> {
        self.get("core", "bare")
    }

    pub fn filemode(&self) -> BitResult<Option<bool>> {
        self.get("core", "filemode")
    }
}

impl Config<'_, '_> {
    pub fn repositoryformatversion(&self) -> BitResult<Option<i64>> {
        self.rcx.with_local_config(|config| config.repositoryformatversion())
    }

    pub fn bare(&self) -> BitResult<Option<bool>> {
        self.rcx.with_local_config(|config| config.bare())
    }

    pub fn filemode(&self) -> BitResult<Option<bool>> {
        self.rcx.with_local_config(|config| config.filemode())
    }
}
