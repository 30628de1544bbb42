//! Exit code constants for the specforge CLI.
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Run completed, every component ready |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments, configuration or input |
//! | 3 | `NEEDS_REVIEW` | Run completed but components await human review |
//! | 70 | `GENERATION_FAILURE` | The generation collaborator failed |

/// Exit codes matching the documented exit code table.
///
/// ```rust
/// use specforge_utils::exit_codes::ExitCode;
///
/// assert_eq!(ExitCode::NEEDS_REVIEW.as_i32(), 3);
/// assert_eq!(ExitCode::from_i32(70), ExitCode::GENERATION_FAILURE);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);

    pub const INTERNAL: ExitCode = ExitCode(1);

    /// Invalid or missing command-line arguments, configuration, or input file
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// Some components ended in `needs_human_review`
    pub const NEEDS_REVIEW: ExitCode = ExitCode(3);

    /// At least one component failed in a generation step
    pub const GENERATION_FAILURE: ExitCode = ExitCode(70);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
        assert_eq!(ExitCode::INTERNAL.as_i32(), 1);
        assert_eq!(ExitCode::CLI_ARGS.as_i32(), 2);
        assert_eq!(ExitCode::NEEDS_REVIEW.as_i32(), 3);
        assert_eq!(ExitCode::GENERATION_FAILURE.as_i32(), 70);
        assert_eq!(i32::from(ExitCode::CLI_ARGS), 2);
    }
}
