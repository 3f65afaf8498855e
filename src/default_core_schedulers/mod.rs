pub mod fair_scheduler;
