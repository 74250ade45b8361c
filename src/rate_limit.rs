use std::{hash::Hash, net::SocketAddr, sync::Arc, time::Duration};

use governor::{clock, state::keyed::DefaultKeyedStateStore, RateLimiter};
use reqwest::{Method, StatusCode};
use tokio::task::JoinHandle;
use tracing::debug;
use warp::{
    filters::BoxedFilter,
    path::Peek,
    reply::{Json, WithStatus},
    Filter, Rejection, Reply,
};

use crate::util::ErrorMessage;

/// Answers 429 once the caller's address runs out of quota. Otherwise
/// rejects, so the request falls through to the routes.
pub fn ip_rate_limit_filter(
    limiter: Arc<
        RateLimiter<
            Option<SocketAddr>,
            DefaultKeyedStateStore<Option<SocketAddr>>,
            clock::DefaultClock,
        >,
    >,
) -> BoxedFilter<(impl Reply,)> {
    warp::addr::remote()
        .and(warp::any().map(move || limiter.clone()))
        .and_then(check_ip_limiter)
        .boxed()
}

async fn check_ip_limiter(
    ip: Option<SocketAddr>,
    limiter: Arc<
        RateLimiter<
            Option<SocketAddr>,
            DefaultKeyedStateStore<Option<SocketAddr>>,
            clock::DefaultClock,
        >,
    >,
) -> Result<WithStatus<Json>, Rejection> {
    let rate_limit_reply = warp::reply::with_status(
        warp::reply::json(&ErrorMessage::from("Rate limit exceeded for this address")),
        StatusCode::TOO_MANY_REQUESTS,
    );
    let response = limiter.check_key(&ip);
    match response {
        Ok(_) => Err(warp::reject()),
        Err(_) => Ok(rate_limit_reply),
    }
}

/// Keyed by the request path and method, shared by every caller.
type PathLimiter = Arc<
    RateLimiter<(String, Method), DefaultKeyedStateStore<(String, Method)>, clock::DefaultClock>,
>;

pub fn path_method_limit_filter(limiter: PathLimiter) -> BoxedFilter<(impl Reply,)> {
    warp::path::peek()
        .and(warp::method())
        .and(warp::any().map(move || limiter.clone()))
        .and_then(check_path_limiter)
        .boxed()
}

async fn check_path_limiter(
    path: Peek,
    method: Method,
    limiter: PathLimiter,
) -> Result<WithStatus<Json>, Rejection> {
    let rate_limit_reply = warp::reply::with_status(
        warp::reply::json(&ErrorMessage::from("Rate limit exceeded for this endpoint")),
        StatusCode::TOO_MANY_REQUESTS,
    );
    let response = limiter.check_key(&(path.as_str().into(), method));
    match response {
        Ok(_) => Err(warp::reject()),
        Err(_) => Ok(rate_limit_reply),
    }
}

/// Forgets keys whose quota has fully replenished.
pub fn prune<K: Hash + Eq + Clone>(
    limiter: &RateLimiter<K, DefaultKeyedStateStore<K>, clock::DefaultClock>,
) {
    limiter.retain_recent();
    limiter.shrink_to_fit();
}

/// Prunes `limiter` every `period` for as long as the runtime lives.
pub fn spawn_cleanup<K>(
    limiter: Arc<RateLimiter<K, DefaultKeyedStateStore<K>, clock::DefaultClock>>,
    period: Duration,
) -> JoinHandle<()>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            prune(&limiter);
            debug!(keys = limiter.len(), "Pruned rate limiter.");
        }
    })
}
