//! Third-party notices shipped with the binary.

/// Crates compiled into the `tcpmux` binary on Unix targets and their
/// licenses, direct dependencies and everything they pull in at runtime.
/// Proc-macro and build-only crates are not part of the executable.
pub const THIRD_PARTY: &[(&str, &str)] = &[
    ("aho-corasick", "Unlicense OR MIT"),
    ("anstream", "MIT OR Apache-2.0"),
    ("anstyle", "MIT OR Apache-2.0"),
    ("anstyle-parse", "MIT OR Apache-2.0"),
    ("anstyle-query", "MIT OR Apache-2.0"),
    ("anyhow", "MIT OR Apache-2.0"),
    ("bytes", "MIT"),
    ("cfg-if", "MIT OR Apache-2.0"),
    ("clap", "MIT OR Apache-2.0"),
    ("clap_builder", "MIT OR Apache-2.0"),
    ("clap_lex", "MIT OR Apache-2.0"),
    ("colorchoice", "MIT OR Apache-2.0"),
    ("futures-core", "MIT OR Apache-2.0"),
    ("futures-sink", "MIT OR Apache-2.0"),
    ("is_terminal_polyfill", "MIT OR Apache-2.0"),
    ("itoa", "MIT OR Apache-2.0"),
    ("lazy_static", "MIT OR Apache-2.0"),
    ("libc", "MIT OR Apache-2.0"),
    ("lock_api", "MIT OR Apache-2.0"),
    ("log", "MIT OR Apache-2.0"),
    ("matchers", "MIT"),
    ("memchr", "Unlicense OR MIT"),
    ("mio", "MIT"),
    ("nu-ansi-term", "MIT"),
    ("once_cell", "MIT OR Apache-2.0"),
    ("parking_lot", "MIT OR Apache-2.0"),
    ("parking_lot_core", "MIT OR Apache-2.0"),
    ("pin-project-lite", "Apache-2.0 OR MIT"),
    ("regex-automata", "MIT OR Apache-2.0"),
    ("regex-syntax", "MIT OR Apache-2.0"),
    ("ryu", "Apache-2.0 OR BSL-1.0"),
    ("scopeguard", "MIT OR Apache-2.0"),
    ("serde", "MIT OR Apache-2.0"),
    ("serde_json", "MIT OR Apache-2.0"),
    ("sharded-slab", "MIT"),
    ("signal-hook-registry", "Apache-2.0 OR MIT"),
    ("smallvec", "MIT OR Apache-2.0"),
    ("socket2", "MIT OR Apache-2.0"),
    ("strsim", "MIT"),
    ("thiserror", "MIT OR Apache-2.0"),
    ("thread_local", "MIT OR Apache-2.0"),
    ("tokio", "MIT"),
    ("tokio-util", "MIT"),
    ("tracing", "MIT"),
    ("tracing-core", "MIT"),
    ("tracing-log", "MIT"),
    ("tracing-serde", "MIT"),
    ("tracing-subscriber", "MIT"),
    ("utf8parse", "MIT OR Apache-2.0"),
];

const APACHE_NOTICE: &str = "\
Licensed under the Apache License, Version 2.0. You may obtain a copy of the
License at http://www.apache.org/licenses/LICENSE-2.0";

const MIT_NOTICE: &str = "\
Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the \"Software\"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED \"AS IS\", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT.";

/// Full notice text printed by `--legal`.
pub fn notices() -> String {
    let mut out = String::from(
        "This executable contains unmodified code from several Rust crates.\n\
         Some of them require licensing information to be made available to the end user.\n\n",
    );
    for (name, license) in THIRD_PARTY {
        out.push_str(&format!("  {name}: {license}\n"));
    }
    out.push_str("\nMIT License\n\n");
    out.push_str(MIT_NOTICE);
    out.push_str("\n\nApache License 2.0\n\n");
    out.push_str(APACHE_NOTICE);
    out.push('\n');
    out
}
