//! Error types for program loading

use thiserror::Error;

/// Reasons a program is rejected at load time.
#[derive(Error, Debug)]
pub enum BytecodeError {
    /// The JSON encoding could not be parsed or produced
    #[error("Malformed program: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A register index exceeds the register file
    #[error("{function}@{offset}: register r{register} out of range (register count {count})")]
    RegisterOutOfRange {
        /// Function name
        function: String,
        /// Instruction offset
        offset: usize,
        /// Offending register
        register: usize,
        /// Register file size
        count: usize,
    },

    /// The register file cannot hold the fixed layout
    #[error("{function}: register count {count} is below the required {required}")]
    RegisterFileTooSmall {
        /// Function name
        function: String,
        /// Minimum size
        required: usize,
        /// Declared size
        count: usize,
    },

    /// A jump or handler target lies outside the body
    #[error("{function}@{offset}: target {target} out of range")]
    TargetOutOfRange {
        /// Function name
        function: String,
        /// Instruction offset
        offset: usize,
        /// Offending target
        target: usize,
    },

    /// A constant index exceeds the constant pool
    #[error("{function}@{offset}: constant #{index} out of range")]
    InvalidConstant {
        /// Function name
        function: String,
        /// Instruction offset
        offset: usize,
        /// Offending index
        index: usize,
    },

    /// A constant references a body that does not exist
    #[error("{function}: reference to unknown function #{id}")]
    UnknownFunction {
        /// Function name
        function: String,
        /// Offending id
        id: usize,
    },

    /// A BigInt constant is not a decimal integer
    #[error("{function}: invalid BigInt literal {literal:?}")]
    InvalidBigInt {
        /// Function name
        function: String,
        /// Offending literal
        literal: String,
    },

    /// A protected region is empty, out of range or protects its own handler
    #[error("{function}: invalid protected region {start}..{end} (handler {handler})")]
    InvalidRegion {
        /// Function name
        function: String,
        /// Region start
        start: usize,
        /// Region end
        end: usize,
        /// Handler offset
        handler: usize,
    },

    /// Two protected regions partially overlap
    #[error("{function}: protected regions {first} and {second} overlap without nesting")]
    OverlappingRegions {
        /// Function name
        function: String,
        /// Index of the first region
        first: usize,
        /// Index of the second region
        second: usize,
    },

    /// A host call names an import the program does not declare
    #[error("{function}@{offset}: host function {name:?} is not declared")]
    UndeclaredHost {
        /// Function name
        function: String,
        /// Instruction offset
        offset: usize,
        /// Import name
        name: String,
    },

    /// The entry point does not exist
    #[error("Entry function #{0} does not exist")]
    InvalidEntry(usize),

    /// A label was used but never bound
    #[error("{function}: label {label} was never bound")]
    UnboundLabel {
        /// Function name
        function: String,
        /// Label index
        label: usize,
    },

    /// `patch_jump` was pointed at a non-jump instruction
    #[error("{function}@{offset}: not a jump instruction")]
    NotAJump {
        /// Function name
        function: String,
        /// Instruction offset
        offset: usize,
    },

    /// A reserved function id was never defined
    #[error("Function #{0} was reserved but never defined")]
    UndefinedFunction(usize),
}

/// Result alias for loading
pub type Result<T> = std::result::Result<T, BytecodeError>;
