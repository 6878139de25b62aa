pub mod adc;
pub mod indicator;
pub mod sim;

#[cfg(target_os = "espidf")]
pub mod network;
