#![warn(missing_docs)]
//! Backend interface for kiln.
//!
//! A [`Backend`] turns a kiln IR module into one or more SPIR-V word
//! streams. [`BackendOptions`] selects the target version and whether debug
//! names are kept, [`OutputFile`] carries the words together with a decoded
//! [`ModuleHeader`], and [`BackendRegistry`] maps `--target` names to
//! backends for the command line.

use std::fmt::Debug;

use kiln_ir::Module;

/// Magic number that opens every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Highest SPIR-V minor version (of major version 1) a backend may target.
pub const MAX_SPIRV_MINOR: u8 = 6;

/// A backend that compiles kiln IR into SPIR-V.
pub trait Backend: Debug + Send + Sync {
    /// Human-readable name (e.g. "SPIR-V").
    fn name(&self) -> &str;

    /// Target identifiers this backend handles (for `--target` dispatch).
    fn targets(&self) -> &[&str];

    /// Compile an IR module. Implementations reject options that fail
    /// [`BackendOptions::validate`].
    fn compile(&self, module: &Module, opts: &BackendOptions)
    -> Result<BackendOutput, BackendError>;
}

/// Options passed to a backend during compilation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendOptions {
    /// Target SPIR-V version as `(major, minor)`.
    pub spirv_version: (u8, u8),
    /// Emit `OpName` / `OpMemberName` for named IR entities.
    pub debug_names: bool,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            spirv_version: (1, 3),
            debug_names: true,
        }
    }
}

impl BackendOptions {
    /// Checks that the requested version is one of 1.0 through 1.6.
    pub fn validate(&self) -> Result<(), BackendError> {
        match self.spirv_version {
            (1, minor) if minor <= MAX_SPIRV_MINOR => Ok(()),
            (major, minor) => Err(BackendError::Unsupported(format!(
                "SPIR-V version {major}.{minor}"
            ))),
        }
    }

    /// The version as it appears in the second header word.
    pub fn version_word(&self) -> u32 {
        let (major, minor) = self.spirv_version;
        (u32::from(major) << 16) | (u32::from(minor) << 8)
    }
}

/// Everything a backend produced for one IR module.
#[derive(Clone, Debug)]
pub struct BackendOutput {
    /// Emitted modules, usually exactly one.
    pub files: Vec<OutputFile>,
}

impl BackendOutput {
    /// Output holding a single module.
    pub fn single(name: impl Into<String>, words: Vec<u32>) -> Self {
        Self {
            files: vec![OutputFile {
                name: name.into(),
                words,
            }],
        }
    }
}

/// One emitted SPIR-V module.
#[derive(Clone, Debug)]
pub struct OutputFile {
    /// Suggested filename (e.g. "module.spv").
    pub name: String,
    /// The module as 32-bit words, header included.
    pub words: Vec<u32>,
}

impl OutputFile {
    /// Little-endian bytes, as written to a `.spv` file.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    /// Decodes the five-word header, or `None` if the words do not start
    /// with one.
    pub fn header(&self) -> Option<ModuleHeader> {
        match self.words[..] {
            [SPIRV_MAGIC, version, generator, bound, 0, ..] => Some(ModuleHeader {
                version: ((version >> 16) as u8, (version >> 8) as u8),
                generator,
                bound,
            }),
            _ => None,
        }
    }
}

/// The fields of a SPIR-V header that vary between modules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModuleHeader {
    /// `(major, minor)` version.
    pub version: (u8, u8),
    /// Generator magic; 0 for an unregistered tool.
    pub generator: u32,
    /// One past the largest result id in the module.
    pub bound: u32,
}

/// Errors that can occur during backend compilation.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The module or options use something this backend cannot express.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// A general backend error.
    #[error("{0}")]
    Other(String),
}

/// Registry of available backends, used for CLI `--target` dispatch.
#[derive(Default)]
pub struct BackendRegistry {
    backends: Vec<Box<dyn Backend>>,
}

impl BackendRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a backend.
    pub fn register(&mut self, backend: Box<dyn Backend>) {
        self.backends.push(backend);
    }

    /// Finds a backend that handles the given target identifier.
    pub fn find(&self, target: &str) -> Option<&dyn Backend> {
        self.backends
            .iter()
            .find(|b| b.targets().contains(&target))
            .map(|b| &**b)
    }

    /// Lists all supported target identifiers.
    pub fn list_targets(&self) -> Vec<&str> {
        self.backends
            .iter()
            .flat_map(|b| b.targets().iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct HeaderOnly;

    impl Backend for HeaderOnly {
        fn name(&self) -> &str {
            "header only"
        }

        fn targets(&self) -> &[&str] {
            &["header", "hdr"]
        }

        fn compile(
            &self,
            _module: &Module,
            opts: &BackendOptions,
        ) -> Result<BackendOutput, BackendError> {
            opts.validate()?;
            let words = vec![SPIRV_MAGIC, opts.version_word(), 0, 1, 0];
            Ok(BackendOutput::single("module.spv", words))
        }
    }

    #[test]
    fn registry_dispatches_by_target() {
        let mut reg = BackendRegistry::new();
        assert!(reg.list_targets().is_empty());
        reg.register(Box::new(HeaderOnly));
        assert_eq!(reg.find("hdr").map(|b| b.name()), Some("header only"));
        assert!(reg.find("spirv").is_none());
        assert_eq!(reg.list_targets(), ["header", "hdr"]);
    }

    #[test]
    fn default_options() {
        let opts = BackendOptions::default();
        assert_eq!(opts.spirv_version, (1, 3));
        assert!(opts.debug_names);
        assert_eq!(opts.version_word(), 0x0001_0300);
    }

    #[test]
    fn versions_outside_one_zero_to_one_six_are_rejected() {
        for version in [(1, 0), (1, 4), (1, 6)] {
            let opts = BackendOptions {
                spirv_version: version,
                ..Default::default()
            };
            assert!(opts.validate().is_ok(), "{version:?}");
        }
        for version in [(1, 7), (2, 0), (0, 9)] {
            let opts = BackendOptions {
                spirv_version: version,
                ..Default::default()
            };
            assert!(
                matches!(opts.validate(), Err(BackendError::Unsupported(_))),
                "{version:?}"
            );
        }
    }

    #[test]
    fn output_file_decodes_its_header() {
        let opts = BackendOptions {
            spirv_version: (1, 5),
            debug_names: false,
        };
        let output = HeaderOnly.compile(&Module::default(), &opts).unwrap();
        let file = &output.files[0];
        assert_eq!(
            file.header(),
            Some(ModuleHeader {
                version: (1, 5),
                generator: 0,
                bound: 1,
            })
        );
        assert_eq!(file.to_bytes()[..8], [0x03, 0x02, 0x23, 0x07, 0, 5, 1, 0]);
    }

    #[test]
    fn truncated_or_foreign_words_have_no_header() {
        let short = OutputFile {
            name: "short.spv".into(),
            words: vec![SPIRV_MAGIC, 0x0001_0000],
        };
        assert_eq!(short.header(), None);
        let foreign = OutputFile {
            name: "foreign.spv".into(),
            words: vec![0xdead_beef, 0x0001_0000, 0, 1, 0],
        };
        assert_eq!(foreign.header(), None);
    }

    #[test]
    fn backend_error_display() {
        let e1 = BackendError::Unsupported("SPIR-V version 2.0".into());
        assert_eq!(format!("{e1}"), "unsupported: SPIR-V version 2.0");

        let e2 = BackendError::Other("internal failure".into());
        assert_eq!(format!("{e2}"), "internal failure");
    }
}
