//! Immutable group → member → name table.
//!
//! The directory is built once before any transport starts and is then shared
//! behind an `Arc`. Nothing mutates it after construction, so lookups from
//! any number of tasks need no lock.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result};

const GROUP_KEYWORD: &str = "group";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Directory {
    groups: HashMap<String, HashMap<String, String>>,
}

impl Directory {
    /// Resolves a member of a group to its name.
    pub fn lookup(&self, group: &str, member: &str) -> Option<&str> {
        self.groups
            .get(group)
            .and_then(|members| members.get(member))
            .map(String::as_str)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn member_count(&self) -> usize {
        self.groups.values().map(HashMap::len).sum()
    }

    /// Reads the line format used by the directory files:
    ///
    /// ```text
    /// Group 1
    /// 2 Ada Lovelace
    /// 3 Alan Turing
    /// ```
    ///
    /// A line whose first token is `group` (any case) switches the current
    /// group to the following token. Every other non-blank line is a member id
    /// followed by the member's name, which runs to the end of the line.
    /// Members listed before the first declaration land in the empty group,
    /// and a `group` line without an id leaves the current group alone.
    /// Names are not required to be UTF-8; invalid bytes are replaced.
    pub fn from_reader<R: BufRead>(mut reader: R) -> io::Result<Self> {
        let mut directory = Directory::default();
        let mut current_group = String::new();
        let mut raw = Vec::new();

        loop {
            raw.clear();
            if reader.read_until(b'\n', &mut raw)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&raw);
            match parse_line(&line) {
                Some(Entry::Group(group)) => current_group = group.to_string(),
                Some(Entry::Member { id, name }) => {
                    directory.insert(current_group.clone(), id.to_string(), name.to_string());
                }
                None => {}
            }
        }

        Ok(directory)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open directory file {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to read directory file {}", path.display()))
    }

    fn insert(&mut self, group: String, member: String, name: String) {
        self.groups.entry(group).or_default().insert(member, name);
    }
}

impl<G, M, N> FromIterator<(G, M, N)> for Directory
where
    G: Into<String>,
    M: Into<String>,
    N: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (G, M, N)>>(entries: I) -> Self {
        let mut directory = Directory::default();
        for (group, member, name) in entries {
            directory.insert(group.into(), member.into(), name.into());
        }
        directory
    }
}

enum Entry<'a> {
    Group(&'a str),
    Member { id: &'a str, name: &'a str },
}

fn parse_line(line: &str) -> Option<Entry<'_>> {
    let line = line.trim();
    let (first, rest) = match line.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim_start()),
        None => (line, ""),
    };

    if first.is_empty() {
        return None;
    }

    if first.eq_ignore_ascii_case(GROUP_KEYWORD) {
        return rest.split_whitespace().next().map(Entry::Group);
    }

    Some(Entry::Member {
        id: first,
        name: rest,
    })
}
