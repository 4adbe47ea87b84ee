/// PLC通信相关模块

/// Modbus TCP 实现
pub mod modbus_plc;

/// Mock PLC实现（用于开发和测试）
pub mod mock_plc;


pub use modbus_plc::{ModbusPlc, ModbusPlcConfig, PlcStats};
pub use mock_plc::MockPlc;
