pub mod core {
    pub mod bus;
    pub mod config;
    pub mod event;
    pub mod message;
    pub mod middleware;
    pub mod service;
}

pub mod services {
    pub mod dummy;
    pub mod xmpp;
}

pub mod middlewares {
    pub mod commands;
    pub mod greeter;
    pub mod logger;
}
