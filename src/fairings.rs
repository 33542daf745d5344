use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Method, Status};
use rocket::{Request, Response};

use crate::audit::ViewMark;
use crate::auth::{RequestMeta, SessionResolution};
use crate::state::AppState;

/// Records a generic page view for successful GETs by a signed-in user,
/// unless the handler already recorded something more specific.
pub struct PageViewFairing;

#[rocket::async_trait]
impl Fairing for PageViewFairing {
    fn info(&self) -> Info {
        Info {
            name: "Page View Logger",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        if req.method() != Method::Get || res.status() != Status::Ok {
            return;
        }
        let Some(state) = req.rocket().state::<AppState>() else {
            return;
        };
        if !state.settings.log_page_views {
            return;
        }

        // Only read what a guard already resolved; never resolve here.
        let session = req.local_cache(|| SessionResolution::Anonymous);
        let Some(user) = session.user() else {
            return;
        };
        let mark = req.local_cache(ViewMark::default);

        let view_name = req
            .route()
            .and_then(|route| route.name.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| req.uri().path().to_string());
        let ctx = RequestMeta::of(req).context(Some(user.actor()));
        state
            .audit
            .log_page_view(&ctx, mark, &view_name, &state.settings.view_log_skip);
    }
}
