mod merge_tests;
mod router_tests;
mod utils;
