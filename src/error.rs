use core::alloc::Layout;

use thiserror::Error;

/// Returned when a [`SizedAny`](crate::SizedAny) is asked for a type it does
/// not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("bad any cast: requested `{requested}`, {}", describe(.found))]
pub struct BadAnyCast {
    requested: &'static str,
    found: Option<&'static str>,
}

impl BadAnyCast {
    pub(crate) fn new(requested: &'static str, found: Option<&'static str>) -> Self {
        BadAnyCast { requested, found }
    }

    /// Name of the type that was asked for.
    pub fn requested(&self) -> &'static str {
        self.requested
    }

    /// Name of the type actually held, or `None` if the container was empty.
    pub fn found(&self) -> Option<&'static str> {
        self.found
    }
}

fn describe(found: &Option<&'static str>) -> Found {
    Found(*found)
}

struct Found(Option<&'static str>);

impl core::fmt::Display for Found {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.0 {
            Some(name) => write!(f, "container holds `{name}`"),
            None => f.write_str("container is empty"),
        }
    }
}

/// Returned by the `try_*` operations when the heap block a value needs
/// could not be allocated.
///
/// The containers involved are left exactly as they were before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("memory allocation of {} bytes (align {}) failed", .layout.size(), .layout.align())]
pub struct AllocError {
    layout: Layout,
}

impl AllocError {
    pub(crate) fn new(layout: Layout) -> Self {
        AllocError { layout }
    }

    /// Layout of the block that could not be allocated.
    pub fn layout(&self) -> Layout {
        self.layout
    }
}
