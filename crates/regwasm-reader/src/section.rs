//! Section codes and their ordering rules.

use std::fmt;

/// Logical sections, in the order the module generator visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SectionCode {
    Type,
    Import,
    Function,
    Table,
    Memory,
    Global,
    Export,
    Start,
    Element,
    DataCount,
    Code,
    Data,
    /// The `name` custom section.
    Name,
}

impl SectionCode {
    pub const ORDER: [SectionCode; 13] = [
        Self::Type,
        Self::Import,
        Self::Function,
        Self::Table,
        Self::Memory,
        Self::Global,
        Self::Export,
        Self::Start,
        Self::Element,
        Self::DataCount,
        Self::Code,
        Self::Data,
        Self::Name,
    ];

    /// Section that must have been seen before this one.
    pub fn precedent(self) -> Option<SectionCode> {
        match self {
            Self::Function | Self::Start | Self::Name => Some(Self::Type),
            Self::Code => Some(Self::Function),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::Import => "import",
            Self::Function => "function",
            Self::Table => "table",
            Self::Memory => "memory",
            Self::Global => "global",
            Self::Export => "export",
            Self::Start => "start",
            Self::Element => "element",
            Self::DataCount => "datacount",
            Self::Code => "code",
            Self::Data => "data",
            Self::Name => "name",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
