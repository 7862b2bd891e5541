//! Loads a JSON fixture of travellers, routes and points into a store snapshot.
//!
//! Usage: `seed [fixture.json]`. The snapshot lands at `store.snapshot_path`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use auth_adapters::LocalAuth;
use bytes::Bytes;
use configs::{BlobSettings, LogFormat, LogSettings, MapSettings, Settings, SwapMode};
use domains::{
    Actor, AuthProvider, Coordinates, DocumentStore, Geocoder, PlaceTag, RouteId, SignUp, Visibility,
};
use serde::Deserialize;
use services::{
    initial_viewport, resolve_viewport, CommentService, MapDefaults, MapScene, NewRoute, PointCollection,
    PointDraft, RelationRepository, RelationSubject, RouteCatalog, SwapStrategy,
};
use storage_adapters::{LocalBlobStorage, MemoryStore};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_FIXTURE: &str = "cmd/seed/fixtures/routes.json";
const DEFAULT_SNAPSHOT: &str = "data/store.json";

#[derive(Debug, Deserialize)]
struct Fixture {
    users: Vec<FixtureUser>,
    routes: Vec<FixtureRoute>,
}

#[derive(Debug, Deserialize)]
struct FixtureUser {
    email: String,
    password: String,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FixtureRoute {
    /// Email of one of the fixture users.
    owner: String,
    title: String,
    city: String,
    #[serde(default = "one_day")]
    days: u32,
    #[serde(default)]
    visibility: Visibility,
    /// Cover image, relative to the fixture file.
    cover: Option<PathBuf>,
    #[serde(default)]
    points: Vec<FixturePoint>,
    #[serde(default)]
    liked_by: Vec<String>,
    #[serde(default)]
    favorite_of: Vec<String>,
    #[serde(default)]
    comments: Vec<FixtureComment>,
}

#[derive(Debug, Deserialize)]
struct FixturePoint {
    title: String,
    description: Option<String>,
    address: Option<String>,
    #[serde(default)]
    category: PlaceTag,
    lat: Option<f64>,
    lng: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FixtureComment {
    author: String,
    text: String,
}

fn one_day() -> u32 {
    1
}

#[tokio::main]
async fn main() {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("seed: {e}");
            std::process::exit(2);
        }
    };
    init_tracing(&settings.log);

    if let Err(e) = run(settings).await {
        error!(error = ?e, "seeding failed");
        std::process::exit(1);
    }
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let fixture_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FIXTURE));
    let fixture = read_fixture(&fixture_path).await?;

    let store = Arc::new(MemoryStore::new());
    let auth = LocalAuth::new();
    let catalog = RouteCatalog::new(store.clone())
        .with_paging(settings.routes.default_page_size, settings.routes.favorites_overfetch_min);
    let relations = RelationRepository::new(store.clone());
    let comments = CommentService::new(store.clone());
    let geocoder = geocoder(&settings);
    let blobs = blob_storage(&settings.blobs);
    let map_defaults = map_defaults(&settings.map)?;
    let fixture_dir = fixture_path.parent().map(Path::to_path_buf).unwrap_or_default();
    let swap_strategy = match settings.points.swap_strategy {
        SwapMode::Atomic => SwapStrategy::Atomic,
        SwapMode::Sequential => SwapStrategy::Sequential,
    };

    let mut actors = Vec::with_capacity(fixture.users.len());
    for user in fixture.users {
        let actor = auth
            .sign_up(SignUp {
                email: user.email.clone(),
                password: user.password,
                display_name: user.display_name,
            })
            .await
            .with_context(|| format!("signing up {}", user.email))?;
        actors.push((user.email.trim().to_lowercase(), actor));
    }
    let find = |email: &str| find_actor(&actors, email);

    let store_handle: Arc<dyn DocumentStore> = store.clone();
    for route in fixture.routes {
        let owner = find(&route.owner)?;
        let id = catalog
            .create(
                NewRoute {
                    title: route.title.clone(),
                    city: route.city.clone(),
                    days: route.days,
                    visibility: route.visibility,
                    cover_photo_url: None,
                },
                owner,
            )
            .await
            .with_context(|| format!("creating route {:?}", route.title))?;
        if let Some(cover) = &route.cover {
            let url = attach_cover(&catalog, &blobs, &id, &fixture_dir.join(cover)).await?;
            info!(route = %id, %url, "cover uploaded");
        }

        let mut points = PointCollection::new(store_handle.clone(), id.clone()).with_swap_strategy(swap_strategy);
        points.load().await.context("loading a fresh route")?;
        for point in route.points {
            add_point(&mut points, point, geocoder.as_deref()).await;
        }
        let scene = MapScene::from_points(points.points());
        let mut viewport = initial_viewport(points.points(), None, Some(&route.city), &map_defaults);
        if let Some(geocoder) = geocoder.as_deref() {
            viewport = resolve_viewport(viewport, geocoder, &map_defaults).await;
        }
        info!(
            route = %id,
            markers = scene.markers.len(),
            arrows = scene.arrows.len(),
            ?viewport,
            "route seeded"
        );

        for email in &route.liked_by {
            let key = RelationSubject::RouteLike(id.clone()).for_actor(find(email)?.id.clone());
            relations.toggle(&key).await.with_context(|| format!("liking {id} as {email}"))?;
        }
        for email in &route.favorite_of {
            let key = RelationSubject::Favorite(id.clone()).for_actor(find(email)?.id.clone());
            relations.toggle(&key).await.with_context(|| format!("favoriting {id} as {email}"))?;
        }
        for comment in &route.comments {
            comments
                .add(&id, Some(find(&comment.author)?), &comment.text)
                .await
                .with_context(|| format!("commenting on {id}"))?;
        }
    }

    let snapshot = settings
        .store
        .snapshot_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT));
    if let Some(parent) = snapshot.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    store
        .save_snapshot(&snapshot)
        .await
        .with_context(|| format!("writing snapshot {}", snapshot.display()))?;
    info!(path = %snapshot.display(), users = actors.len(), "snapshot written");
    Ok(())
}

fn find_actor<'a>(actors: &'a [(String, Actor)], email: &str) -> anyhow::Result<&'a Actor> {
    let key = email.trim().to_lowercase();
    match actors.iter().find(|(e, _)| *e == key) {
        Some((_, actor)) => Ok(actor),
        None => bail!("fixture references unknown user {email}"),
    }
}

fn blob_storage(settings: &BlobSettings) -> LocalBlobStorage {
    LocalBlobStorage::new(settings.root.clone(), settings.url_prefix.as_str())
}

fn map_defaults(settings: &MapSettings) -> anyhow::Result<MapDefaults> {
    let center = Coordinates::new(settings.default_center.lat, settings.default_center.lng)
        .context("map.default_center")?;
    Ok(MapDefaults {
        center,
        zoom: settings.default_zoom,
    })
}

async fn attach_cover(
    catalog: &RouteCatalog,
    blobs: &LocalBlobStorage,
    route: &RouteId,
    path: &Path,
) -> anyhow::Result<String> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading cover {}", path.display()))?;
    let content_type = mime_guess::from_path(path).first_or_octet_stream();
    catalog
        .upload_cover(blobs, route, Bytes::from(data), &content_type)
        .await
        .with_context(|| format!("uploading cover {}", path.display()))
}

async fn read_fixture(path: &Path) -> anyhow::Result<Fixture> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading fixture {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing fixture {}", path.display()))
}

#[cfg(feature = "geocoder-http")]
fn geocoder(settings: &Settings) -> Option<Box<dyn Geocoder>> {
    use secrecy::ExposeSecret;

    let key = settings.map.api_key.as_ref()?;
    Some(Box::new(storage_adapters::HttpGeocoder::new(key.expose_secret())))
}

#[cfg(not(feature = "geocoder-http"))]
fn geocoder(_settings: &Settings) -> Option<Box<dyn Geocoder>> {
    None
}

/// Points that fail validation are reported and skipped.
/// A point with an address but no coordinates is geocoded when a geocoder is configured.
async fn add_point(points: &mut PointCollection, point: FixturePoint, geocoder: Option<&dyn Geocoder>) {
    let coordinates = match (point.lat, point.lng) {
        (Some(lat), Some(lng)) => match Coordinates::new(lat, lng) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(title = %point.title, error = %e, "skipping point with invalid coordinates");
                return;
            }
        },
        _ => match (geocoder, point.address.as_deref()) {
            (Some(geocoder), Some(address)) => lookup(geocoder, address).await,
            _ => None,
        },
    };
    let title = point.title.clone();
    let draft = PointDraft {
        title: point.title,
        description: point.description,
        address: point.address,
        photo_url: None,
        category: point.category,
        order: None,
        coordinates,
    };
    if let Err(e) = points.add(draft, None).await {
        warn!(%title, route = %points.route_id(), error = %e, "skipping point");
    }
}

async fn lookup(geocoder: &dyn Geocoder, address: &str) -> Option<Coordinates> {
    match geocoder.geocode(address).await {
        Ok(Some(found)) => Coordinates::new(found.lat, found.lng).ok(),
        Ok(None) => {
            warn!(%address, "address did not resolve");
            None
        }
        Err(e) => {
            warn!(%address, error = %e, "geocoding failed");
            None
        }
    }
}
