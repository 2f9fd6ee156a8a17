use actix_web::{dev::HttpServiceFactory, web};

pub mod routes {
    pub mod billing;
    pub mod webhook;
}

pub mod services {
    pub(crate) mod checkout;
    pub(crate) mod customer;
    pub(crate) mod schedule;
    pub mod webhook;
}

mod dtos {
    pub(crate) mod billing;
}

pub fn mount_billing() -> actix_web::Scope {
    web::scope("")
        .service(routes::billing::post_create_checkout)
        .service(routes::billing::post_create_portal)
        .service(routes::billing::get_pending_change)
        .service(routes::billing::post_cancel_schedule)
        .service(routes::billing::post_schedule_downgrade)
}

pub fn mount_webhook() -> impl HttpServiceFactory {
    routes::webhook::post_webhook
}
