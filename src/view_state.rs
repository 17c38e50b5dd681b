use chrono::NaiveDate;

use crate::models::Poll;
use crate::permissions::{Permission, PermissionSet};

/**
 * What a request for a single poll ends up showing
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollView {
    /// The poll has not started yet, show the listing instead
    Index,
    VoteForm,
    Results,
    /// Already voted, but results stay hidden until the poll ends
    ResultsHidden,
    Forbidden,
}

/**
 * Decide what a user sees for a poll.
 *
 * The order of the checks matters: a poll which has not started is never revealed, not even to
 * users who cannot view it.
 */
pub fn resolve(
    poll: &Poll,
    today: NaiveDate,
    perms: &PermissionSet,
    participated: bool,
) -> PollView {
    if !poll.has_started(today) {
        return PollView::Index;
    }
    if !perms.contains(Permission::View) {
        return PollView::Forbidden;
    }
    if !perms.contains(Permission::Vote) {
        return PollView::Results;
    }
    if poll.has_ended(today) {
        return PollView::Results;
    }
    if participated {
        if poll.show_results_immediately {
            return PollView::Results;
        }
        return PollView::ResultsHidden;
    }
    PollView::VoteForm
}

/**
 * A poll accepts a vote from this user right now
 */
pub fn is_votable(poll: &Poll, today: NaiveDate, perms: &PermissionSet, participated: bool) -> bool {
    resolve(poll, today, perms, participated) == PollView::VoteForm
}
