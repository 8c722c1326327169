use super::handlers::{debug, health, movies, tokens, users};
use utoipa::openapi::{
    Contact, InfoBuilder, License, OpenApiBuilder, Tag,
    security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated `OpenAPI` spec.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::healthcheck))
        .routes(routes!(debug::debug_vars))
        .routes(routes!(users::register))
        .routes(routes!(users::activate))
        .routes(routes!(users::update_password))
        .routes(routes!(tokens::create_authentication_token))
        .routes(routes!(tokens::create_activation_token))
        .routes(routes!(tokens::create_password_reset_token))
        .routes(routes!(movies::list_movies, movies::create_movie))
        .routes(routes!(movies::show_movie, movies::update_movie));

    let openapi = router.get_openapi_mut();
    openapi.tags = Some(vec![
        tag("reelgate", "Service status"),
        tag("users", "Registration, activation and password reset"),
        tag("tokens", "Authentication and one-time tokens"),
        tag("movies", "Movie catalogue"),
    ]);
    if let Some(components) = openapi.components.as_mut() {
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }

    router
}

fn tag(name: &str, description: &str) -> Tag {
    let mut tag = Tag::new(name);
    tag.description = Some(description.to_string());
    tag
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new()
        .info(info)
        .components(Some(utoipa::openapi::Components::new()))
        .build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|trimmed| !trimmed.is_empty())
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.split_once('<') {
        Some((name, rest)) => (
            optional_str(name),
            optional_str(rest.trim_end_matches('>')),
        ),
        None => (optional_str(author), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, "reelgate");
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Reelgate"));
            assert_eq!(contact.email.as_deref(), Some("team@reelgate.dev"));
        }

        let license = spec.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.identifier.as_deref(), Some("BSD-3-Clause"));
        }
    }

    #[test]
    fn openapi_documents_every_route() {
        let spec = openapi();
        let tags = spec.tags.clone().unwrap_or_default();
        for name in ["reelgate", "users", "tokens", "movies"] {
            assert!(tags.iter().any(|tag| tag.name == name), "{name}");
        }
        for path in [
            "/v1/healthcheck",
            "/debug/vars",
            "/v1/users",
            "/v1/users/activated",
            "/v1/users/password",
            "/v1/tokens/authentication",
            "/v1/tokens/activation",
            "/v1/tokens/password-reset",
            "/v1/movies",
            "/v1/movies/{id}",
        ] {
            assert!(spec.paths.paths.contains_key(path), "{path}");
        }
    }

    #[test]
    fn parse_author_handles_missing_parts() {
        assert_eq!(
            parse_author("Team Reelgate <team@reelgate.dev>"),
            (Some("Team Reelgate"), Some("team@reelgate.dev"))
        );
        assert_eq!(parse_author("Solo"), (Some("Solo"), None));
        assert_eq!(parse_author(""), (None, None));
    }
}
