use actix_web::dev::ServiceRequest;
use actix_web::HttpRequest;

const UNKNOWN: &str = "unknown";

/// 优先取 X-Forwarded-For 的第一个地址，否则使用连接的对端地址
pub fn resolve(headers: &actix_web::http::header::HeaderMap, peer: Option<std::net::SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

pub fn of_service_request(req: &ServiceRequest) -> String {
    resolve(req.headers(), req.peer_addr())
}

pub fn of_request(req: &HttpRequest) -> String {
    resolve(req.headers(), req.peer_addr())
}
