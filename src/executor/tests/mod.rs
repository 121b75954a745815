mod helpers;

mod async_tests;
