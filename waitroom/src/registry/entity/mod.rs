//! 活动目录实体
//! Activity registry entities

pub mod activities;
pub mod queue_entries;

pub use activities::Entity as Activities;
pub use queue_entries::Entity as QueueEntries;
