pub mod fake_env;
