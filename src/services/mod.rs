pub mod attempt_service;
pub mod availability;
pub mod enrollment_service;
pub mod grade_scale;
pub mod grading_service;
pub mod pool_service;
pub mod timer_service;
