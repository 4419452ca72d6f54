// Domain layer - Widget model and pure data algorithms
pub mod dashboard;
pub mod layout;
pub mod normalizer;
pub mod provider;
pub mod series;
pub mod widget;
