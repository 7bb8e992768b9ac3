pub mod commands {
    pub const INIT: &str = "BX101";
    pub const ADD: &str = "BX110";
    pub const REMOVE: &str = "BX111";
    pub const INSTALL: &str = "BX120";
    pub const STATUS: &str = "BX140";
    pub const SYNC: &str = "BX150";
    pub const GENERIC: &str = "BX000";
}
