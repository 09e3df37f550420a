// SPDX-License-Identifier: GPL-2.0

//! Device attribute groups.
//!
//! A group is a named set of attribute files backed by one [`AttributeOperations`]
//! implementation. Reads fill a page-sized buffer; writes hand over the raw buffer and report how
//! many bytes were consumed.

use std::fmt::Write;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Size of a sysfs page; `show` output is truncated to it.
pub const PAGE_SIZE: usize = 4096;

/// Readable by everyone.
pub const S_IRUGO: u16 = 0o444;

/// Owner and group may write.
pub const S_IWUSR_GRP: u16 = 0o220;

/// Owner and group read and write, others read.
pub const S_IRW_GRP: u16 = 0o664;

/// One attribute file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    /// File name.
    pub name: &'static str,
    /// Permission bits.
    pub mode: u16,
}

impl Attribute {
    /// Creates an attribute description.
    pub const fn new(name: &'static str, mode: u16) -> Self {
        Self { name, mode }
    }

    /// Returns true if some class may read the file.
    pub fn readable(&self) -> bool {
        self.mode & 0o444 != 0
    }

    /// Returns true if some class may write the file.
    pub fn writable(&self) -> bool {
        self.mode & 0o222 != 0
    }
}

/// Handlers behind a group's attributes, addressed by index into the group's attribute table.
pub trait AttributeOperations: Send + Sync {
    /// Formats attribute `id` into `page`.
    fn show(&self, id: usize, page: &mut String) -> Result;

    /// Parses a write to attribute `id`; returns the number of bytes consumed.
    fn store(&self, id: usize, page: &str) -> Result<usize>;
}

/// A named group of attributes.
pub struct AttributeGroup {
    name: &'static str,
    attrs: &'static [Attribute],
    ops: Arc<dyn AttributeOperations>,
}

impl AttributeGroup {
    /// Creates a group over `attrs`.
    pub fn new(
        name: &'static str,
        attrs: &'static [Attribute],
        ops: Arc<dyn AttributeOperations>,
    ) -> Self {
        Self { name, attrs, ops }
    }

    /// Group (directory) name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Attributes of the group.
    pub fn attrs(&self) -> &'static [Attribute] {
        self.attrs
    }

    fn lookup(&self, attr: &str) -> Result<(usize, &Attribute)> {
        self.attrs
            .iter()
            .enumerate()
            .find(|(_, a)| a.name == attr)
            .ok_or(Error::InvalidArgument)
    }

    /// Reads attribute `attr`.
    pub fn show(&self, attr: &str) -> Result<String> {
        let (id, a) = self.lookup(attr)?;
        if !a.readable() {
            return Err(Error::NoAccess);
        }
        let mut page = String::new();
        self.ops.show(id, &mut page)?;
        if page.len() > PAGE_SIZE {
            let mut end = PAGE_SIZE;
            while !page.is_char_boundary(end) {
                end -= 1;
            }
            page.truncate(end);
        }
        Ok(page)
    }

    /// Writes `page` to attribute `attr`.
    pub fn store(&self, attr: &str, page: &str) -> Result<usize> {
        let (id, a) = self.lookup(attr)?;
        if !a.writable() {
            return Err(Error::NoAccess);
        }
        self.ops.store(id, page)
    }
}

/// Appends `values` separated by spaces and ends the line, `"v0 v1 ... \n"`.
pub fn write_table(page: &mut String, values: impl IntoIterator<Item = u32>) {
    for v in values {
        let _ = write!(page, "{v} ");
    }
    page.push('\n');
}

/// Parses the leading unsigned decimal of `buf` after whitespace, like `sscanf("%u")`.
pub fn scan_u32(buf: &str) -> Option<u32> {
    let s = buf.trim_start();
    let s = s.strip_prefix('+').unwrap_or(s);
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}

/// Parses the leading signed decimal of `buf`, like `sscanf("%d")`.
pub fn scan_i32(buf: &str) -> Option<i32> {
    let s = buf.trim_start();
    let (neg, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let value: i64 = digits[..end].parse().ok()?;
    i32::try_from(if neg { -value } else { value }).ok()
}

/// Splits `buf` at its first whitespace character.
///
/// Returns the leading word and the remainder, or `None` when `buf` starts with whitespace or
/// is empty.
pub fn split_word(buf: &str) -> Option<(&str, &str)> {
    let end = buf.find(char::is_whitespace).unwrap_or(buf.len());
    if end == 0 {
        return None;
    }
    Some(buf.split_at(end))
}
