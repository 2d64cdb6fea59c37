#[cfg(not(target_arch = "wasm32"))]
mod native {
    extern crate trellis;

    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use tracing::{info, warn};
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    use trellis::core::store::MemoryStore;
    use trellis::serializers::Links;
    use trellis::Dispatcher;

    mod adapter {
        use actix_web::HttpRequest;
        use spin_sdk::http::{Method, Request};

        pub fn actix_to_spin_request(req: &HttpRequest, body: actix_web::web::Bytes) -> Request {
            let method = match req.method().as_str() {
                "GET" => Method::Get,
                "POST" => Method::Post,
                "PUT" => Method::Put,
                "DELETE" => Method::Delete,
                "HEAD" => Method::Head,
                "OPTIONS" => Method::Options,
                "PATCH" => Method::Patch,
                other => Method::Other(other.to_string()),
            };

            let mut builder = Request::builder();
            builder.method(method).uri(req.uri().to_string());

            for (name, value) in req.headers() {
                if let Ok(val_str) = value.to_str() {
                    builder.header(name.as_str(), val_str);
                }
            }

            builder.body(body.to_vec()).build()
        }

        pub fn spin_to_actix_response(spin_resp: spin_sdk::http::Response) -> actix_web::HttpResponse {
            let status = *spin_resp.status();

            let mut response = actix_web::HttpResponse::build(
                actix_web::http::StatusCode::from_u16(status)
                    .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
            );
            if let Some(content_type) = spin_resp.header("Content-Type").and_then(|v| v.as_str()) {
                response.content_type(content_type.to_string());
            }

            response.body(spin_resp.body().to_vec())
        }
    }

    type AppState = Dispatcher<MemoryStore>;

    pub async fn run() -> std::io::Result<()> {
        dotenv::dotenv().ok();
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .init();

        let state = web::Data::new(AppState::new(MemoryStore::new(), Links::from_env()));

        if trellis::config::seed_enabled() {
            if let Err(err) = trellis::core::db::init_test_data(state.store()) {
                warn!(error = %err, "demo data not initialised");
            }
        }

        let addr = trellis::config::bind_addr();
        info!("Server listening on http://{}", addr);

        HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .default_service(web::route().to(handle_all))
        })
        .bind(addr)?
        .run()
        .await
    }

    async fn handle_all(req: HttpRequest, body: web::Bytes, state: web::Data<AppState>) -> HttpResponse {
        let spin_req = adapter::actix_to_spin_request(&req, body);
        let spin_resp = state.handle(&spin_req);
        adapter::spin_to_actix_response(spin_resp)
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    native::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
