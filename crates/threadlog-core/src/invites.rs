//! INVITE and EXTERNAL_INVITE blocks.
//!
//! Invites are stored in the block store so the invitee can fetch them by
//! hash, but they are never indexed and never become the head: they are
//! capabilities for one recipient, not part of the thread's history.

use tracing::info;

use threadlog_shared::block::{ExternalInvitePayload, InvitePayload, Payload};
use threadlog_shared::crypto::{generate_symmetric_key, SymmetricKey};
use threadlog_shared::invite::InviteBody;
use threadlog_shared::types::{Hash, PeerId};
use threadlog_store::ThreadPeer;

use crate::error::Result;
use crate::fanout;
use crate::thread::Thread;

impl Thread {
    /// What an invitee needs to materialize this thread.
    pub(crate) fn invite_body(&self) -> Result<InviteBody> {
        let inviter_username = self.ctx.db()?.get_username()?;
        Ok(InviteBody {
            thread_secret: *self.secret.secret_bytes(),
            thread_key: self.sym_key,
            key: self.key.clone(),
            name: self.name.clone(),
            schema: self.schema,
            initiator: self.initiator,
            kind: self.kind,
            inviter_username,
        })
    }

    /// Seal an invite to `invitee` and post it to that peer only.
    pub async fn add_invite(&self, invitee: PeerId) -> Result<Hash> {
        let sealed_body = self.invite_body()?.seal_for(&invitee)?;
        let sealed = {
            let lock = self.mux.lock().await;
            self.store_block(
                &lock,
                Payload::Invite(InvitePayload {
                    invitee,
                    sealed: sealed_body,
                }),
            )
            .await?
        };

        let recipient = ThreadPeer {
            id: invitee,
            thread_id: self.id,
            username: None,
            inboxes: Vec::new(),
        };
        fanout::post(
            self.ctx.transport.as_ref(),
            self.id,
            sealed.hash,
            &sealed.bytes,
            std::slice::from_ref(&recipient),
        )
        .await;

        info!(thread = %self.id, invite = %sealed.hash, invitee = %invitee, "Created invite");
        Ok(sealed.hash)
    }

    /// Create an invite anyone holding the returned key can redeem.  Nothing
    /// is posted; the hash and key travel out of band.
    pub async fn add_external_invite(&self) -> Result<(Hash, SymmetricKey)> {
        let key = generate_symmetric_key();
        let ciphertext = self.invite_body()?.encrypt_with(&key)?;
        let sealed = {
            let lock = self.mux.lock().await;
            self.store_block(&lock, Payload::ExternalInvite(ExternalInvitePayload { ciphertext }))
                .await?
        };

        info!(thread = %self.id, invite = %sealed.hash, "Created external invite");
        Ok((sealed.hash, key))
    }
}
