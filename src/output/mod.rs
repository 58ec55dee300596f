mod response;

pub use response::{print_failure, print_result, print_success};
