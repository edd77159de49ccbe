pub mod mail_address;
