//! HTTP handler functions for the efficiency index API.

use actix_web::error::{InternalError, QueryPayloadError};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, web};
use efficiency_index_query::{CatalogQuery, QueryError};
use efficiency_index_server_models::{
    ApiCategoriesResponse, ApiCategorySummary, ApiCompareResponse, ApiError, ApiHealth,
    ApiRegionalImpactResponse, ApiSearchResponse, ApiStatsResponse, ApiTopPerformersResponse,
    CompareQueryParams, LimitQueryParams, RegionQueryParams, SearchQueryParams,
};

use crate::AppState;

fn error_response(status: StatusCode, error: String) -> HttpResponse {
    HttpResponse::build(status).json(ApiError {
        error,
        status_code: status.as_u16(),
    })
}

fn query_failure(e: &QueryError) -> HttpResponse {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
    log::debug!("Rejected query ({status}): {e}");
    error_response(status, e.to_string())
}

/// Error handler for query strings that fail to deserialize.
pub fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = error_response(
        StatusCode::BAD_REQUEST,
        format!("invalid query parameters: {err}"),
    );
    InternalError::from_response(err, response).into()
}

/// Fallback for unknown routes under `/api`.
pub async fn not_found() -> HttpResponse {
    error_response(StatusCode::NOT_FOUND, "no such endpoint".to_string())
}

/// `GET /api/health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let catalog = state.catalog.snapshot();
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        snapshot_id: Some(catalog.snapshot_id.clone()).filter(|id| !id.is_empty()),
    })
}

/// `GET /api/search`
///
/// Filtered search within one category, best score first.
pub async fn search(
    state: web::Data<AppState>,
    params: web::Query<SearchQueryParams>,
) -> HttpResponse {
    let Some(category) = params.category.as_deref().filter(|c| !c.trim().is_empty()) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "missing required parameter 'category'".to_string(),
        );
    };

    let catalog = state.catalog.snapshot();
    let query = CatalogQuery::new(&catalog, &state.regions);
    match query.search(category, params.filters(), params.limit) {
        Ok(results) => HttpResponse::Ok().json(ApiSearchResponse::from(results)),
        Err(e) => query_failure(&e),
    }
}

/// `GET /api/top-performers/{category}`
///
/// An unknown category in the path is a missing resource, not a bad
/// parameter.
pub async fn top_performers(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<LimitQueryParams>,
) -> HttpResponse {
    let catalog = state.catalog.snapshot();
    let query = CatalogQuery::new(&catalog, &state.regions);
    match query.top_performers(&path, params.limit) {
        Ok(results) => HttpResponse::Ok().json(ApiTopPerformersResponse::from(results)),
        Err(e @ QueryError::UnknownCategory(_)) => {
            error_response(StatusCode::NOT_FOUND, e.to_string())
        }
        Err(e) => query_failure(&e),
    }
}

/// `GET /api/compare?models=a,b,c`
pub async fn compare(
    state: web::Data<AppState>,
    params: web::Query<CompareQueryParams>,
) -> HttpResponse {
    let catalog = state.catalog.snapshot();
    let query = CatalogQuery::new(&catalog, &state.regions);
    match query.compare(&params.model_list()) {
        Ok(comparison) => HttpResponse::Ok().json(ApiCompareResponse::from(comparison)),
        Err(e) => query_failure(&e),
    }
}

/// `GET /api/stats`
pub async fn stats(state: web::Data<AppState>) -> HttpResponse {
    let catalog = state.catalog.snapshot();
    let query = CatalogQuery::new(&catalog, &state.regions);
    HttpResponse::Ok().json(ApiStatsResponse::new(
        catalog.snapshot_id.clone(),
        query.stats(),
    ))
}

/// `GET /api/categories`
pub async fn categories(state: web::Data<AppState>) -> HttpResponse {
    let catalog = state.catalog.snapshot();
    let query = CatalogQuery::new(&catalog, &state.regions);
    HttpResponse::Ok().json(ApiCategoriesResponse {
        categories: query
            .categories()
            .iter()
            .map(ApiCategorySummary::from)
            .collect(),
    })
}

/// `GET /api/regional-impact/{model}`
///
/// Without `region`, returns every precomputed region.
pub async fn regional_impact(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<RegionQueryParams>,
) -> HttpResponse {
    let catalog = state.catalog.snapshot();
    let query = CatalogQuery::new(&catalog, &state.regions);
    match query.regional_impact(&path, params.region.as_deref()) {
        Ok(view) => HttpResponse::Ok().json(ApiRegionalImpactResponse::from(view)),
        Err(e) => query_failure(&e),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use actix_web::{App, test};
    use chrono::{TimeZone, Utc};
    use efficiency_index_appliance_models::{Category, EfficiencyRating, FuelType};
    use efficiency_index_catalog::{CatalogHandle, CatalogMetadata, assemble};
    use efficiency_index_catalog_models::{CatalogEntry, ScoredRecord};
    use efficiency_index_regional::RegionTable;
    use efficiency_index_regional_models::US_AVERAGE;
    use efficiency_index_source_models::NormalizedRecord;
    use serde_json::Value;

    use super::*;
    use crate::configure;

    fn entry(
        regions: &RegionTable,
        category: Category,
        manufacturer: &str,
        model: &str,
        score: f64,
        kwh: f64,
    ) -> CatalogEntry {
        let scored = ScoredRecord {
            record: NormalizedRecord {
                manufacturer: manufacturer.to_string(),
                model_number: model.to_string(),
                category,
                fuel: FuelType::Electric,
                annual_energy_kwh_equivalent: kwh,
                annual_therms: None,
                capacity_or_throughput: 20.0,
                efficiency_factor: None,
                energy_star_certified: score >= 75.0,
            },
            open_efficiency_score: score,
            efficiency_rating: EfficiencyRating::from_score(score),
            raw_efficiency_ratio: 20.0 / kwh,
            efficiency_percentile: 50.0,
        };
        let us = efficiency_index_regional::impact(&scored, regions.resolve(US_AVERAGE).unwrap());
        CatalogEntry {
            scored,
            regional_impact: BTreeMap::from([(US_AVERAGE.to_string(), us)]),
        }
    }

    fn state() -> web::Data<AppState> {
        let regions = RegionTable::embedded();
        let categories = BTreeMap::from([
            (
                Category::Refrigerators,
                vec![
                    entry(&regions, Category::Refrigerators, "GE", "G-1", 60.0, 520.0),
                    entry(&regions, Category::Refrigerators, "LG", "L-1", 93.0, 407.0),
                ],
            ),
            (
                Category::Dishwashers,
                vec![entry(&regions, Category::Dishwashers, "Bosch", "B-1", 80.0, 240.0)],
            ),
        ]);
        let catalog = assemble(
            CatalogMetadata {
                generated_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
                thresholds_version: "test".to_string(),
                regions_version: regions.version().to_string(),
                regions: vec![US_AVERAGE.to_string()],
            },
            categories,
        );
        web::Data::new(AppState {
            catalog: Arc::new(CatalogHandle::new(catalog)),
            regions: Arc::new(regions),
        })
    }

    macro_rules! get {
        ($uri:expr) => {
            get!(state(), $uri)
        };
        ($state:expr, $uri:expr) => {{
            let app = test::init_service(App::new().app_data($state).configure(configure)).await;
            let resp =
                test::call_service(&app, test::TestRequest::get().uri($uri).to_request()).await;
            let status = resp.status();
            let body: Value = test::read_body_json(resp).await;
            (status, body)
        }};
    }

    #[actix_web::test]
    async fn health_reports_snapshot() {
        let (status, body) = get!("/api/health");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["healthy"], true);
        assert!(body["snapshot_id"].as_str().unwrap().starts_with("20260301"));
    }

    #[actix_web::test]
    async fn search_returns_ranked_appliances() {
        let (status, body) = get!("/api/search?category=refrigerators&manufacturer=l");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["category"], "refrigerators");
        assert_eq!(body["total_results"], 1);
        assert_eq!(body["appliances"][0]["model_number"], "L-1");
        assert_eq!(body["appliances"][0]["efficiency_rating"], "A+");
        assert_eq!(body["filters"]["manufacturer"], "l");

        let (_, body) = get!("/api/search?category=Refrigerators&energy_star=true");
        assert_eq!(body["total_results"], 1);
        assert_eq!(body["filters"]["energy_star_only"], true);
    }

    #[actix_web::test]
    async fn search_rejects_bad_parameters() {
        let (status, body) = get!("/api/search");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status_code"], 400);

        let (status, _) = get!("/api/search?category=toasters");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get!("/api/search?category=refrigerators&min_score=80&max_score=20");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = get!("/api/search?category=refrigerators&limit=lots");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status_code"], 400);
        assert!(body["error"].as_str().unwrap().starts_with("invalid query parameters"));
    }

    #[actix_web::test]
    async fn top_performers_uses_path_category() {
        let (status, body) = get!("/api/top-performers/refrigerators?limit=1");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_results"], 1);
        assert_eq!(body["appliances"][0]["model_number"], "L-1");

        let (status, body) = get!("/api/top-performers/toasters");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status_code"], 404);
    }

    #[actix_web::test]
    async fn compare_reports_found_and_missing() {
        let (status, body) = get!("/api/compare?models=L-1,G-1,NOPE");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["models_requested"], 3);
        assert_eq!(body["models_found"], 2);
        assert_eq!(body["models_not_found"], serde_json::json!(["NOPE"]));
        assert_eq!(body["comparison"].as_array().unwrap().len(), 2);
        assert_eq!(body["insights"]["category"], "refrigerators");
        assert_eq!(
            body["insights"]["best_performer"]["model_number"],
            "L-1"
        );

        let (status, body) = get!("/api/compare?models=L-1,B-1");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["models_found"], 2);
        assert!(body["insights"].is_null());

        let (status, _) = get!("/api/compare");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get!("/api/compare?models=1,2,3,4,5,6,7,8,9,10,11");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn regional_impact_by_region() {
        let (status, body) = get!("/api/regional-impact/L-1");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["appliance"]["manufacturer"], "LG");
        assert!(body["regional_impact"][US_AVERAGE].is_object());

        let (status, body) = get!("/api/regional-impact/L-1?region=TX");
        assert_eq!(status, StatusCode::OK);
        let impacts = body["regional_impact"].as_object().unwrap();
        assert_eq!(impacts.len(), 1);
        assert!(impacts.contains_key("texas"));

        let (status, _) = get!("/api/regional-impact/L-1?region=Atlantis");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = get!("/api/regional-impact/NOPE");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status_code"], 404);
    }

    #[actix_web::test]
    async fn regional_impact_rejects_mismatched_region_table() {
        let state = state();
        let mut catalog = (*state.catalog.snapshot()).clone();
        catalog.regions_version = "custom-2025".to_string();
        state.catalog.replace(catalog);

        let (status, body) = get!(state.clone(), "/api/regional-impact/L-1?region=TX");
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status_code"], 409);

        let (status, _) = get!(state, "/api/regional-impact/L-1?region=us_average");
        assert_eq!(status, StatusCode::OK);
    }

    #[actix_web::test]
    async fn search_accepts_brand_and_min_efficiency_aliases() {
        let (status, body) = get!("/api/search?category=refrigerators&brand=ge");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_results"], 1);
        assert_eq!(body["appliances"][0]["model_number"], "G-1");
        assert_eq!(body["filters"]["manufacturer"], "ge");

        let (status, body) = get!("/api/search?category=refrigerators&min_efficiency=70");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_results"], 1);
        assert_eq!(body["appliances"][0]["model_number"], "L-1");
    }

    #[actix_web::test]
    async fn stats_and_categories_come_from_snapshot() {
        let (status, body) = get!("/api/stats");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database_info"]["total_models"], 3);
        assert_eq!(body["database_info"]["total_energy_star"], 2);
        assert!(body["methodology"].is_object());

        let (status, body) = get!("/api/categories");
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["categories"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["refrigerators", "dishwashers"]);
        assert_eq!(
            body["categories"][0]["top_performer"]["model_number"],
            "L-1"
        );
    }

    #[actix_web::test]
    async fn unknown_endpoint_is_json_404() {
        let (status, body) = get!("/api/nope");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "no such endpoint");
    }
}
