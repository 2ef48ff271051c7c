mod ip_utils;

pub use ip_utils::{guess_local_ip, list_lan_ipv4};
