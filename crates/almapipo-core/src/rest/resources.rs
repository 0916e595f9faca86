//! Resource dispatch table
//!
//! Maps an (api, record kind) pair to the path template of its records and
//! the methods Alma supports for it. Adding a resource kind is one entry in
//! [`RESOURCES`].

use almapipo_common::types::{Action, RecordId};

use crate::error::{CoreError, CoreResult};

const ALL: &[Action] = &Action::ALL;
const READ_ONLY: &[Action] = &[Action::Get];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub api: &'static str,
    pub kind: &'static str,
    /// Path with one `{}` per id segment, ancestor first
    pub template: &'static str,
    pub segments: usize,
    pub methods: &'static [Action],
}

pub const RESOURCES: &[ResourceDescriptor] = &[
    ResourceDescriptor {
        api: "bibs",
        kind: "bibs",
        template: "/bibs/{}",
        segments: 1,
        methods: ALL,
    },
    ResourceDescriptor {
        api: "bibs",
        kind: "holdings",
        template: "/bibs/{}/holdings/{}",
        segments: 2,
        methods: ALL,
    },
    ResourceDescriptor {
        api: "bibs",
        kind: "items",
        template: "/bibs/{}/holdings/{}/items/{}",
        segments: 3,
        methods: ALL,
    },
    ResourceDescriptor {
        api: "bibs",
        kind: "portfolios",
        template: "/bibs/{}/portfolios/{}",
        segments: 2,
        methods: ALL,
    },
    ResourceDescriptor {
        api: "electronic",
        kind: "e-collections",
        template: "/electronic/e-collections/{}",
        segments: 1,
        methods: ALL,
    },
    ResourceDescriptor {
        api: "electronic",
        kind: "e-services",
        template: "/electronic/e-collections/{}/e-services/{}",
        segments: 2,
        methods: ALL,
    },
    ResourceDescriptor {
        api: "electronic",
        kind: "portfolios",
        template: "/electronic/e-collections/{}/e-services/{}/portfolios/{}",
        segments: 3,
        methods: ALL,
    },
    ResourceDescriptor {
        api: "users",
        kind: "users",
        template: "/users/{}",
        segments: 1,
        methods: ALL,
    },
    ResourceDescriptor {
        api: "acq",
        kind: "vendors",
        template: "/acq/vendors/{}",
        segments: 1,
        methods: ALL,
    },
    ResourceDescriptor {
        api: "conf",
        kind: "libraries",
        template: "/conf/libraries/{}",
        segments: 1,
        methods: READ_ONLY,
    },
    ResourceDescriptor {
        api: "conf",
        kind: "locations",
        template: "/conf/libraries/{}/locations/{}",
        segments: 2,
        methods: ALL,
    },
];

/// Lookup over [`RESOURCES`]
pub struct ResourceTable;

impl ResourceTable {
    pub fn lookup(api: &str, kind: &str) -> CoreResult<&'static ResourceDescriptor> {
        RESOURCES
            .iter()
            .find(|r| r.api == api && r.kind == kind)
            .ok_or_else(|| CoreError::unknown_resource(api, kind))
    }

    pub fn all() -> &'static [ResourceDescriptor] {
        RESOURCES
    }
}

impl ResourceDescriptor {
    pub fn supports(&self, action: Action) -> bool {
        self.methods.contains(&action)
    }

    pub fn ensure_supports(&self, action: Action) -> CoreResult<()> {
        if self.supports(action) {
            Ok(())
        } else {
            Err(CoreError::UnsupportedMethod {
                api: self.api.to_string(),
                kind: self.kind.to_string(),
                action,
            })
        }
    }

    /// Path of the record itself, used for GET, PUT and DELETE
    pub fn record_path(&self, record_id: &RecordId) -> Result<String, PathError> {
        self.check_segments(record_id)?;
        Ok(fill(self.template, record_id.segments()))
    }

    /// Path of the collection the record belongs to, used for POST
    pub fn collection_path(&self, record_id: &RecordId) -> Result<String, PathError> {
        self.check_segments(record_id)?;
        let parent = match self.template.rfind("/{}") {
            Some(pos) => &self.template[..pos],
            None => self.template,
        };
        let segments = record_id.segments();
        Ok(fill(parent, &segments[..segments.len() - 1]))
    }

    fn check_segments(&self, record_id: &RecordId) -> Result<(), PathError> {
        if record_id.len() == self.segments {
            Ok(())
        } else {
            Err(PathError {
                expected: self.segments,
                found: record_id.len(),
            })
        }
    }
}

/// A record id whose segment count does not fit the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Expected {expected} id segment(s), found {found}")]
pub struct PathError {
    pub expected: usize,
    pub found: usize,
}

fn fill(template: &str, segments: &[String]) -> String {
    let mut path = String::with_capacity(template.len() + segments.len() * 20);
    let mut parts = template.split("{}");
    let mut values = segments.iter();

    if let Some(first) = parts.next() {
        path.push_str(first);
    }
    for part in parts {
        if let Some(value) = values.next() {
            path.push_str(value);
        }
        path.push_str(part);
    }
    path
}
