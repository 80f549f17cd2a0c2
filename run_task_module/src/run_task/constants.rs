pub const EXIT_SUCCESS: i32 = 0;
/// The send was attempted and failed, or the task could not be claimed.
pub const EXIT_FAILURE: i32 = 1;
/// Missing argument or an unreadable instruction file.
pub const EXIT_USAGE: i32 = 2;

pub(super) const LOG_DIR_DATE_FORMAT: &str = "%Y-%m-%d";
