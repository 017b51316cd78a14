//! Cross-module tests: workers, outbox and coordinator wired together.

mod pipeline_tests;
