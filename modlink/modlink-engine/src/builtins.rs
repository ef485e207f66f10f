//! Names that can never be claimed by a declaration.

use modlink_core::types::ModuleName;
use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Module identifiers built into the host runtime.
static BUILTIN_MODULES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "assert",
        "assert/strict",
        "async_hooks",
        "buffer",
        "child_process",
        "cluster",
        "console",
        "constants",
        "crypto",
        "dgram",
        "diagnostics_channel",
        "dns",
        "dns/promises",
        "domain",
        "events",
        "fs",
        "fs/promises",
        "http",
        "http2",
        "https",
        "inspector",
        "module",
        "net",
        "os",
        "path",
        "path/posix",
        "path/win32",
        "perf_hooks",
        "process",
        "punycode",
        "querystring",
        "readline",
        "readline/promises",
        "repl",
        "stream",
        "stream/consumers",
        "stream/promises",
        "stream/web",
        "string_decoder",
        "sys",
        "timers",
        "timers/promises",
        "tls",
        "trace_events",
        "tty",
        "url",
        "util",
        "util/types",
        "v8",
        "vm",
        "wasi",
        "worker_threads",
        "zlib",
    ]
    .into_iter()
    .collect()
});

/// The builtin exclusion set plus any configured extra names.
#[derive(Debug, Clone, Default)]
pub struct ReservedNames {
    extra: HashSet<String>,
}

impl ReservedNames {
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extra: extra.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &ModuleName) -> bool {
        let name = name.as_str();
        let bare = name.strip_prefix("node:").unwrap_or(name);
        BUILTIN_MODULES.contains(bare) || self.extra.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ModuleName {
        ModuleName::new(s).unwrap()
    }

    #[test]
    fn test_builtins_are_reserved() {
        let reserved = ReservedNames::default();
        assert!(reserved.contains(&name("fs")));
        assert!(reserved.contains(&name("fs/promises")));
        assert!(reserved.contains(&name("node:path")));
        assert!(!reserved.contains(&name("foo")));
    }

    #[test]
    fn test_extra_names() {
        let reserved = ReservedNames::new(["app"]);
        assert!(reserved.contains(&name("app")));
        assert!(reserved.contains(&name("http")));
        assert!(!reserved.contains(&name("application")));
    }
}
