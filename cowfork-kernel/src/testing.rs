//! Test infrastructure for kernel integration tests.
//!
//! Integration tests are built with `harness = false`; each test file invokes
//! [`test_harness!`](crate::test_harness) to generate its `main`.

/// Trait for test functions that can print their name.
pub trait Testable: Sync {
    fn run(&self);
}

impl<T: Fn() + Sync> Testable for T {
    fn run(&self) {
        print!("{}...\t", core::any::type_name::<T>());
        self();
        println!("[ok]");
    }
}

/// Test runner that executes all test cases.
///
/// A failing test panics, which marks it `[failed]` and exits the process
/// with a non-zero status.
pub fn test_runner(tests: &[&dyn Testable]) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        println!("[failed]");
        println!();
        default_hook(info);
    }));

    println!("Running {} tests", tests.len());
    for test in tests {
        test.run();
    }
    println!();
    println!("All tests passed!");
}

/// Macro to generate test harness boilerplate.
///
/// Usage:
/// ```ignore
/// cowfork_kernel::test_harness!(test1, test2, test3);
/// ```
#[macro_export]
macro_rules! test_harness {
    ($($test:ident),* $(,)?) => {
        fn main() {
            static TESTS: &[&dyn $crate::testing::Testable] = &[$(&$test),*];
            $crate::testing::test_runner(TESTS);
        }
    };
}
