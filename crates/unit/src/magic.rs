//! Headers known to imply extra link or compile flags.

/// What including a known system header adds to the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicInclude {
    /// Literal flags, pushed as public flags.
    Flags(&'static str),
    /// A package whose flags come from the metadata query.
    Package(&'static str),
}

static TABLE: &[(&str, MagicInclude)] = &[
    ("alsa/asoundlib.h", MagicInclude::Package("alsa")),
    ("asoundlib.h", MagicInclude::Package("alsa")),
    (
        "boost/filesystem.hpp",
        MagicInclude::Flags("-lboost_filesystem -lboost_system"),
    ),
    (
        "boost/program_options.hpp",
        MagicInclude::Flags("-lboost_program_options"),
    ),
    ("boost/regex.hpp", MagicInclude::Flags("-lboost_regex")),
    ("boost/system/error_code.hpp", MagicInclude::Flags("-lboost_system")),
    ("boost/thread.hpp", MagicInclude::Flags("-lboost_thread -lboost_system")),
    ("curl/curl.h", MagicInclude::Package("libcurl")),
    ("pthread.h", MagicInclude::Flags("-pthread")),
    ("thread", MagicInclude::Flags("-pthread")),
    ("zlib.h", MagicInclude::Package("zlib")),
];

pub fn lookup(header: &str) -> Option<MagicInclude> {
    TABLE
        .iter()
        .find(|(name, _)| *name == header)
        .map(|(_, magic)| *magic)
}
