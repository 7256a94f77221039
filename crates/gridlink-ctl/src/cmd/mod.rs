//! CLI command modules.

pub mod config;
pub mod send;
pub mod watch;

use anyhow::{bail, Context, Result};

/// `--flag value` pairs collected from a command's arguments.
pub struct Flags<'a> {
    pairs: Vec<(&'a str, &'a str)>,
}

impl<'a> Flags<'a> {
    /// Parse `args`, rejecting anything not listed in `known`.
    pub fn parse(args: &[&'a str], known: &[&str]) -> Result<Self> {
        let mut pairs = Vec::new();
        let mut i = 0;
        while i < args.len() {
            let flag = args[i];
            if !known.contains(&flag) {
                bail!("unknown option: {}", flag);
            }
            i += 1;
            let value = args
                .get(i)
                .with_context(|| format!("{} requires a value", flag))?;
            pairs.push((flag, *value));
            i += 1;
        }
        Ok(Self { pairs })
    }

    /// Last value given for `flag`.
    pub fn get(&self, flag: &str) -> Option<&'a str> {
        self.pairs
            .iter()
            .rev()
            .find(|(f, _)| *f == flag)
            .map(|(_, v)| *v)
    }

    pub fn number<T>(&self, flag: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.get(flag)
            .map(|v| {
                v.parse()
                    .with_context(|| format!("{} must be a number, got {:?}", flag, v))
            })
            .transpose()
    }
}
