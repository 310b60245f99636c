use actix_cors::Cors;
use actix_multipart::Multipart;
use actix_web::{web, App, HttpResponse, HttpServer, Result as ActixResult};
use craftx_core::{Error, FeatureKind, Outlet, ProductId, ProductMetadata};
use craftx_storage::CatalogService;
use futures_util::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Uploads larger than this are rejected while streaming.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

#[derive(Deserialize)]
struct SearchParams {
    top_k: Option<usize>,
}

#[derive(Deserialize)]
struct RelatedParams {
    max_results: Option<usize>,
}

#[derive(Deserialize)]
struct AddOutletRequest {
    outlet_id: String,
    name: String,
    location: String,
    #[serde(default)]
    coordinates: Option<(f64, f64)>,
    #[serde(default)]
    product_ids: Vec<String>,
}

/// Multipart form as posted by the upload endpoints.
#[derive(Default)]
struct UploadForm {
    file: Option<Vec<u8>>,
    fields: HashMap<String, String>,
}

pub struct RestApi;

impl RestApi {
    pub async fn start(catalog: Arc<CatalogService>, port: u16) -> std::io::Result<()> {
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .app_data(web::Data::new(catalog.clone()))
                .configure(routes)
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }
}

/// Every route of the API, for mounting on an existing [`App`].
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/api/v1/search", web::post().to(search))
        .route("/api/v1/products", web::post().to(index_product))
        .route("/api/v1/products/{id}/related", web::get().to(get_related))
        .route("/api/v1/products/{id}/outlets", web::get().to(get_outlets))
        .route("/api/v1/outlets", web::post().to(add_outlet))
        .route("/api/v1/graph/rebuild", web::post().to(rebuild_graph))
        .route("/api/v1/graph/stats", web::get().to(graph_stats));
}

fn error_response(err: &Error) -> HttpResponse {
    let body = serde_json::json!({
        "error": err.to_string()
    });
    match err {
        Error::Decode(_)
        | Error::InvalidDimension { .. }
        | Error::InvalidWeight(_)
        | Error::SelfLoop(_)
        | Error::InvalidConfig(_) => HttpResponse::BadRequest().json(body),
        Error::ProductExists(_) => HttpResponse::Conflict().json(body),
        Error::ProductNotFound(_) => HttpResponse::NotFound().json(body),
        _ => {
            warn!("Request failed: {}", err);
            HttpResponse::InternalServerError().json(body)
        }
    }
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({
        "error": message
    }))
}

async fn read_form(mut payload: Multipart) -> ActixResult<UploadForm> {
    let mut form = UploadForm::default();
    while let Some(item) = payload.next().await {
        let mut field = item?;
        let name = field.name().unwrap_or_default().to_string();

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if data.len() + chunk.len() > MAX_UPLOAD_BYTES {
                return Err(actix_web::error::ErrorPayloadTooLarge("upload too large"));
            }
            data.extend_from_slice(&chunk);
        }

        if name == "file" {
            form.file = Some(data);
        } else {
            form.fields.insert(name, String::from_utf8_lossy(&data).into_owned());
        }
    }
    Ok(form)
}

async fn health(catalog: web::Data<Arc<CatalogService>>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "products": catalog.len(),
    })))
}

async fn search(
    catalog: web::Data<Arc<CatalogService>>,
    params: web::Query<SearchParams>,
    payload: Multipart,
) -> ActixResult<HttpResponse> {
    let form = read_form(payload).await?;
    let Some(image) = form.file else {
        return Ok(bad_request("missing 'file' field"));
    };
    let top_k = params
        .top_k
        .unwrap_or(catalog.config().retrieval.default_top_k);

    let overrides: Option<HashMap<FeatureKind, f32>> = match form.fields.get("weights") {
        Some(raw) => match serde_json::from_str(raw) {
            Ok(weights) => Some(weights),
            Err(e) => return Ok(bad_request(&format!("invalid weights: {}", e))),
        },
        None => None,
    };

    let catalog = catalog.get_ref().clone();
    let result = web::block(move || match overrides {
        Some(weights) => catalog.search_with_weights(&image, top_k, &weights),
        None => catalog.search(&image, top_k),
    })
    .await?;

    match result {
        Ok(response) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "result": response
        }))),
        Err(e) => Ok(error_response(&e)),
    }
}

async fn index_product(
    catalog: web::Data<Arc<CatalogService>>,
    payload: Multipart,
) -> ActixResult<HttpResponse> {
    let mut form = read_form(payload).await?;
    let Some(image) = form.file.take() else {
        return Ok(bad_request("missing 'file' field"));
    };
    let product_id = match form.fields.remove("product_id") {
        Some(id) if !id.trim().is_empty() => ProductId::new(id.trim()),
        _ => return Ok(bad_request("missing 'product_id' field")),
    };
    let title = form.fields.remove("title").unwrap_or_else(|| product_id.to_string());
    let description = form.fields.remove("description").unwrap_or_default();
    let metadata = ProductMetadata::new(title, description);

    let catalog = catalog.get_ref().clone();
    let result = web::block(move || catalog.index_product(&image, product_id, metadata)).await?;

    match result {
        Ok(indexed) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "result": indexed
        }))),
        Err(e) => Ok(error_response(&e)),
    }
}

async fn get_related(
    catalog: web::Data<Arc<CatalogService>>,
    path: web::Path<String>,
    params: web::Query<RelatedParams>,
) -> ActixResult<HttpResponse> {
    let id = ProductId::new(path.into_inner());
    let related = catalog.get_related(&id, params.max_results.unwrap_or(10));
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "result": related
    })))
}

async fn get_outlets(
    catalog: web::Data<Arc<CatalogService>>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let id = ProductId::new(path.into_inner());
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "result": catalog.get_outlets(&id)
    })))
}

async fn add_outlet(
    catalog: web::Data<Arc<CatalogService>>,
    req: web::Json<AddOutletRequest>,
) -> ActixResult<HttpResponse> {
    let req = req.into_inner();
    let outlet = Outlet {
        outlet_id: req.outlet_id,
        name: req.name,
        location: req.location,
        coordinates: req.coordinates,
        products: req.product_ids.into_iter().map(ProductId::new).collect(),
    };

    let catalog = catalog.get_ref().clone();
    match web::block(move || catalog.add_outlet(outlet)).await? {
        Ok(previous) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "result": true,
            "replaced": previous.is_some(),
        }))),
        Err(e) => Ok(error_response(&e)),
    }
}

async fn rebuild_graph(catalog: web::Data<Arc<CatalogService>>) -> ActixResult<HttpResponse> {
    let catalog = catalog.get_ref().clone();
    match web::block(move || catalog.build_graph()).await? {
        Ok(build) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "result": build
        }))),
        Err(e) => Ok(error_response(&e)),
    }
}

async fn graph_stats(catalog: web::Data<Arc<CatalogService>>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "result": catalog.graph_statistics()
    })))
}
