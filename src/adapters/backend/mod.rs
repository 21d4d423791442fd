pub mod alert_client;
