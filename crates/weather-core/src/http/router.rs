use heapless::Vec;
use thiserror_no_std::Error;

use super::Method;
use crate::session::VisitorCounter;

pub const MAX_ROUTES: usize = 12;

/// What the server does for a matched route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Page,
    Stylesheet,
    Script,
    Accumulate,
    SetCounter,
    PushChannel,
    #[cfg(feature = "session-ctx-handlers")]
    Login,
    #[cfg(feature = "session-ctx-handlers")]
    Logout,
}

/// One entry of the route table. `visitors` is the per-route context: routes
/// that carry it count every request they serve.
#[derive(Clone, Copy)]
pub struct Route<'a> {
    pub method: Method,
    pub path: &'static str,
    pub handler: Handler,
    pub visitors: Option<&'a VisitorCounter>,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterError {
    #[error("route table is full ({max} routes)")]
    Full { max: usize },
    #[error("route already registered: {path}")]
    Duplicate { path: &'static str },
}

pub enum Resolved<'r, 'a> {
    Found(&'r Route<'a>),
    MethodNotAllowed,
    NotFound,
}

#[derive(Default)]
pub struct Router<'a> {
    routes: Vec<Route<'a>, MAX_ROUTES>,
}

impl<'a> Router<'a> {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn register(&mut self, route: Route<'a>) -> Result<(), RouterError> {
        if self
            .routes
            .iter()
            .any(|r| r.method == route.method && r.path == route.path)
        {
            return Err(RouterError::Duplicate { path: route.path });
        }
        self.routes
            .push(route)
            .map_err(|_| RouterError::Full { max: MAX_ROUTES })
    }

    pub fn resolve(&self, method: Method, path: &str) -> Resolved<'_, 'a> {
        let mut path_known = false;
        for route in &self.routes {
            if route.path == path {
                if route.method == method {
                    return Resolved::Found(route);
                }
                path_known = true;
            }
        }
        if path_known {
            Resolved::MethodNotAllowed
        } else {
            Resolved::NotFound
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// The weather station's route table.
pub fn weather_routes(visitors: &VisitorCounter) -> Result<Router<'_>, RouterError> {
    let counted = |method, path, handler| Route {
        method,
        path,
        handler,
        visitors: Some(visitors),
    };

    let mut router = Router::new();
    router.register(counted(Method::Get, "/", Handler::Page))?;
    router.register(counted(Method::Get, "/index.html", Handler::Page))?;
    router.register(counted(Method::Get, "/weather.css", Handler::Stylesheet))?;
    router.register(counted(Method::Get, "/weather.js", Handler::Script))?;
    router.register(counted(Method::Post, "/", Handler::Accumulate))?;
    router.register(counted(Method::Put, "/", Handler::SetCounter))?;
    router.register(Route {
        method: Method::Get,
        path: "/ws",
        handler: Handler::PushChannel,
        visitors: None,
    })?;

    #[cfg(feature = "session-ctx-handlers")]
    {
        router.register(counted(Method::Get, "/login", Handler::Login))?;
        router.register(Route {
            method: Method::Get,
            path: "/logout",
            handler: Handler::Logout,
            visitors: None,
        })?;
    }

    Ok(router)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(router: &Router<'_>, method: Method, path: &str) -> Option<Handler> {
        match router.resolve(method, path) {
            Resolved::Found(route) => Some(route.handler),
            _ => None,
        }
    }

    #[test]
    fn test_weather_routes() {
        let visitors = VisitorCounter::new();
        let router = weather_routes(&visitors).unwrap();

        assert_eq!(handler(&router, Method::Get, "/"), Some(Handler::Page));
        assert_eq!(handler(&router, Method::Get, "/index.html"), Some(Handler::Page));
        assert_eq!(handler(&router, Method::Get, "/weather.css"), Some(Handler::Stylesheet));
        assert_eq!(handler(&router, Method::Get, "/weather.js"), Some(Handler::Script));
        assert_eq!(handler(&router, Method::Post, "/"), Some(Handler::Accumulate));
        assert_eq!(handler(&router, Method::Put, "/"), Some(Handler::SetCounter));
        assert_eq!(handler(&router, Method::Get, "/ws"), Some(Handler::PushChannel));
    }

    #[test]
    fn test_unknown_path_and_wrong_method() {
        let visitors = VisitorCounter::new();
        let router = weather_routes(&visitors).unwrap();
        assert!(matches!(router.resolve(Method::Get, "/missing"), Resolved::NotFound));
        assert!(matches!(
            router.resolve(Method::Post, "/weather.css"),
            Resolved::MethodNotAllowed
        ));
        assert!(matches!(
            router.resolve(Method::Other, "/"),
            Resolved::MethodNotAllowed
        ));
    }

    #[test]
    fn test_push_channel_is_not_counted() {
        let visitors = VisitorCounter::new();
        let router = weather_routes(&visitors).unwrap();
        let Resolved::Found(route) = router.resolve(Method::Get, "/ws") else {
            panic!("/ws not routed");
        };
        assert!(route.visitors.is_none());
        let Resolved::Found(route) = router.resolve(Method::Get, "/") else {
            panic!("/ not routed");
        };
        assert!(route.visitors.is_some());
    }

    #[test]
    fn test_register_rejects_duplicates_and_overflow() {
        let mut router = Router::new();
        let route = |path| Route {
            method: Method::Get,
            path,
            handler: Handler::Page,
            visitors: None,
        };
        router.register(route("/")).unwrap();
        assert_eq!(
            router.register(route("/")),
            Err(RouterError::Duplicate { path: "/" })
        );

        const PATHS: [&str; MAX_ROUTES] = [
            "/0", "/1", "/2", "/3", "/4", "/5", "/6", "/7", "/8", "/9", "/10", "/11",
        ];
        let mut result = Ok(());
        for path in PATHS {
            result = router.register(route(path));
            if result.is_err() {
                break;
            }
        }
        assert_eq!(result, Err(RouterError::Full { max: MAX_ROUTES }));
        assert_eq!(router.len(), MAX_ROUTES);
    }

    #[cfg(feature = "session-ctx-handlers")]
    #[test]
    fn test_session_routes() {
        let visitors = VisitorCounter::new();
        let router = weather_routes(&visitors).unwrap();
        assert_eq!(handler(&router, Method::Get, "/login"), Some(Handler::Login));
        assert_eq!(handler(&router, Method::Get, "/logout"), Some(Handler::Logout));
    }
}
