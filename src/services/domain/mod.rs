//! 领域服务层
//!
//! 扫码层的校验、唯一性、序列号与触发源，不依赖具体设备

pub mod code_validator;
pub mod uniqueness_validator;
pub mod serial_generator;
pub mod trigger;

pub use code_validator::{check_layer, parse_layer, CodeRejection, CodeValidator, LayerRead, LayerRejection, ValidationResult};
pub use uniqueness_validator::UniquenessValidator;
pub use serial_generator::{compose_container_code, ContainerCodeFormat, SerialGenerator};
pub use trigger::{SensorEdgeTrigger, SignalStream, TimerTrigger, TriggerSignal, TriggerSource};
