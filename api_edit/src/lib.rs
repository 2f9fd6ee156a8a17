use actix_web::dev::HttpServiceFactory;

pub mod routes {
    pub mod edit;
}

pub mod services {
    pub mod gemini;
}

pub mod dtos {
    pub mod edit;
}

pub fn mount_edit() -> impl HttpServiceFactory {
    (
        routes::edit::post_edit,
        routes::edit::post_generate,
        routes::edit::get_health,
    )
}
