pub mod notifier_traits;
pub mod repository_traits;
