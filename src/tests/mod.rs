//! Pipeline tests: full cycles driven through fake capabilities.

mod cycle_tests;
