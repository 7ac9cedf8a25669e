//! WGSL front end for kiln.
//!
//! Parses WGSL source text into a [`kiln_ir::Module`] by running
//! [naga](https://crates.io/crates/naga)'s WGSL frontend and validator, then
//! lowering the resulting `naga::Module` to kiln IR. The validator's type
//! resolutions are carried over so every IR expression has a type.

mod lower;

/// Parse and validate WGSL source into a kiln IR module.
///
/// Vertex, fragment and compute entry points are all retained. Images,
/// samplers, derivatives and other features without a kiln IR counterpart
/// are rejected with [`ParseError::Unsupported`].
pub fn parse(source: &str) -> Result<kiln_ir::Module, ParseError> {
    let naga_module = naga::front::wgsl::parse_str(source)?;
    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&naga_module)
    .map_err(|e| ParseError::Validation(Box::new(e)))?;
    lower::lower_module(&naga_module, &info)
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Wgsl(#[from] naga::front::wgsl::ParseError),
    #[error("validation: {0}")]
    Validation(Box<naga::WithSpan<naga::valid::ValidationError>>),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("lowering: {0}")]
    Lowering(String),
}
