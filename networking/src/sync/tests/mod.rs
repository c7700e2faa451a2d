mod service_tests;
mod status_tests;
