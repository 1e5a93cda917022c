use crate::context::Context;
use crate::error::{Error, Result};
use crate::http::{Client, Request, Route};
use crate::snowflake::Snowflake;
use crate::types::*;
use reqwest::Method;

fn invite_code(code: &str) -> Result<&str> {
    let code = code.trim();
    if code.is_empty() {
        return Err(Error::Config("invite code is empty".into()));
    }
    Ok(code)
}

impl Client {

    pub async fn get_current_user(&self, ctx: &Context) -> Result<User> {
        self.call(ctx, Request::new(Route::new(Method::GET, "/users/@me")))
            .await
    }

    pub async fn get_guild(&self, ctx: &Context, guild_id: Snowflake) -> Result<Guild> {
        let route = Route::new(Method::GET, "/guilds/{guild_id}").param(guild_id);
        self.call(ctx, Request::new(route)).await
    }

    pub async fn modify_guild(
        &self,
        ctx: &Context,
        guild_id: Snowflake,
        params: &ModifyGuild,
    ) -> Result<Guild> {
        let route = Route::new(Method::PATCH, "/guilds/{guild_id}").param(guild_id);
        self.call(ctx, Request::new(route).json(params)?).await
    }

    pub async fn get_guild_channels(
        &self,
        ctx: &Context,
        guild_id: Snowflake,
    ) -> Result<Vec<Channel>> {
        let route = Route::new(Method::GET, "/guilds/{guild_id}/channels").param(guild_id);
        self.call(ctx, Request::new(route)).await
    }

    pub async fn create_guild_channel(
        &self,
        ctx: &Context,
        guild_id: Snowflake,
        params: &CreateChannel,
    ) -> Result<Channel> {
        let route = Route::new(Method::POST, "/guilds/{guild_id}/channels").param(guild_id);
        self.call(ctx, Request::new(route).json(params)?).await
    }

    pub async fn get_channel(&self, ctx: &Context, channel_id: Snowflake) -> Result<Channel> {
        let route = Route::new(Method::GET, "/channels/{channel_id}").param(channel_id);
        self.call(ctx, Request::new(route)).await
    }

    pub async fn modify_channel(
        &self,
        ctx: &Context,
        channel_id: Snowflake,
        params: &ModifyChannel,
    ) -> Result<Channel> {
        let route = Route::new(Method::PATCH, "/channels/{channel_id}").param(channel_id);
        self.call(ctx, Request::new(route).json(params)?).await
    }

    pub async fn delete_channel(&self, ctx: &Context, channel_id: Snowflake) -> Result<()> {
        let route = Route::new(Method::DELETE, "/channels/{channel_id}").param(channel_id);
        self.call_unit(ctx, Request::new(route)).await
    }

    pub async fn edit_channel_permissions(
        &self,
        ctx: &Context,
        channel_id: Snowflake,
        overwrite_id: Snowflake,
        params: &EditPermissions,
    ) -> Result<()> {
        let route = Route::new(
            Method::PUT,
            "/channels/{channel_id}/permissions/{overwrite_id}",
        )
        .param(channel_id)
        .param(overwrite_id);
        self.call_unit(ctx, Request::new(route).json(params)?).await
    }

    pub async fn delete_channel_permission(
        &self,
        ctx: &Context,
        channel_id: Snowflake,
        overwrite_id: Snowflake,
    ) -> Result<()> {
        let route = Route::new(
            Method::DELETE,
            "/channels/{channel_id}/permissions/{overwrite_id}",
        )
        .param(channel_id)
        .param(overwrite_id);
        self.call_unit(ctx, Request::new(route)).await
    }

    pub async fn get_guild_roles(&self, ctx: &Context, guild_id: Snowflake) -> Result<Vec<Role>> {
        let route = Route::new(Method::GET, "/guilds/{guild_id}/roles").param(guild_id);
        self.call(ctx, Request::new(route)).await
    }

    pub async fn get_guild_role(
        &self,
        ctx: &Context,
        guild_id: Snowflake,
        role_id: Snowflake,
    ) -> Result<Role> {
        let route = Route::new(Method::GET, "/guilds/{guild_id}/roles/{role_id}")
            .param(guild_id)
            .param(role_id);
        self.call(ctx, Request::new(route)).await
    }

    pub async fn create_guild_role(
        &self,
        ctx: &Context,
        guild_id: Snowflake,
        params: &RoleParams,
    ) -> Result<Role> {
        let route = Route::new(Method::POST, "/guilds/{guild_id}/roles").param(guild_id);
        self.call(ctx, Request::new(route).json(params)?).await
    }

    pub async fn modify_guild_role(
        &self,
        ctx: &Context,
        guild_id: Snowflake,
        role_id: Snowflake,
        params: &RoleParams,
    ) -> Result<Role> {
        let route = Route::new(Method::PATCH, "/guilds/{guild_id}/roles/{role_id}")
            .param(guild_id)
            .param(role_id);
        self.call(ctx, Request::new(route).json(params)?).await
    }

    pub async fn modify_guild_role_positions(
        &self,
        ctx: &Context,
        guild_id: Snowflake,
        positions: &[RolePosition],
    ) -> Result<Vec<Role>> {
        let route = Route::new(Method::PATCH, "/guilds/{guild_id}/roles").param(guild_id);
        self.call(ctx, Request::new(route).json(positions)?).await
    }

    pub async fn delete_guild_role(
        &self,
        ctx: &Context,
        guild_id: Snowflake,
        role_id: Snowflake,
    ) -> Result<()> {
        let route = Route::new(Method::DELETE, "/guilds/{guild_id}/roles/{role_id}")
            .param(guild_id)
            .param(role_id);
        self.call_unit(ctx, Request::new(route)).await
    }

    pub async fn get_guild_member(
        &self,
        ctx: &Context,
        guild_id: Snowflake,
        user_id: Snowflake,
    ) -> Result<Member> {
        let route = Route::new(Method::GET, "/guilds/{guild_id}/members/{user_id}")
            .param(guild_id)
            .param(user_id);
        self.call(ctx, Request::new(route)).await
    }

    pub async fn modify_guild_member(
        &self,
        ctx: &Context,
        guild_id: Snowflake,
        user_id: Snowflake,
        params: &ModifyMember,
    ) -> Result<Member> {
        let route = Route::new(Method::PATCH, "/guilds/{guild_id}/members/{user_id}")
            .param(guild_id)
            .param(user_id);
        self.call(ctx, Request::new(route).json(params)?).await
    }

    pub async fn add_guild_member_role(
        &self,
        ctx: &Context,
        guild_id: Snowflake,
        user_id: Snowflake,
        role_id: Snowflake,
    ) -> Result<()> {
        let route = Route::new(
            Method::PUT,
            "/guilds/{guild_id}/members/{user_id}/roles/{role_id}",
        )
        .param(guild_id)
        .param(user_id)
        .param(role_id);
        self.call_unit(ctx, Request::new(route)).await
    }

    pub async fn remove_guild_member_role(
        &self,
        ctx: &Context,
        guild_id: Snowflake,
        user_id: Snowflake,
        role_id: Snowflake,
    ) -> Result<()> {
        let route = Route::new(
            Method::DELETE,
            "/guilds/{guild_id}/members/{user_id}/roles/{role_id}",
        )
        .param(guild_id)
        .param(user_id)
        .param(role_id);
        self.call_unit(ctx, Request::new(route)).await
    }

    pub async fn get_message(
        &self,
        ctx: &Context,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> Result<Message> {
        let route = Route::new(Method::GET, "/channels/{channel_id}/messages/{message_id}")
            .param(channel_id)
            .param(message_id);
        self.call(ctx, Request::new(route)).await
    }

    pub async fn create_message(
        &self,
        ctx: &Context,
        channel_id: Snowflake,
        params: &CreateMessage,
    ) -> Result<Message> {
        let route =
            Route::new(Method::POST, "/channels/{channel_id}/messages").param(channel_id);
        self.call(ctx, Request::new(route).json(params)?).await
    }

    pub async fn edit_message(
        &self,
        ctx: &Context,
        channel_id: Snowflake,
        message_id: Snowflake,
        params: &EditMessage,
    ) -> Result<Message> {
        let route = Route::new(
            Method::PATCH,
            "/channels/{channel_id}/messages/{message_id}",
        )
        .param(channel_id)
        .param(message_id);
        self.call(ctx, Request::new(route).json(params)?).await
    }

    pub async fn delete_message(
        &self,
        ctx: &Context,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> Result<()> {
        let route = Route::new(
            Method::DELETE,
            "/channels/{channel_id}/messages/{message_id}",
        )
        .param(channel_id)
        .param(message_id);
        self.call_unit(ctx, Request::new(route)).await
    }

    pub async fn pin_message(
        &self,
        ctx: &Context,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> Result<()> {
        let route = Route::new(Method::PUT, "/channels/{channel_id}/pins/{message_id}")
            .param(channel_id)
            .param(message_id);
        self.call_unit(ctx, Request::new(route)).await
    }

    pub async fn unpin_message(
        &self,
        ctx: &Context,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> Result<()> {
        let route = Route::new(Method::DELETE, "/channels/{channel_id}/pins/{message_id}")
            .param(channel_id)
            .param(message_id);
        self.call_unit(ctx, Request::new(route)).await
    }

    pub async fn get_webhook(&self, ctx: &Context, webhook_id: Snowflake) -> Result<Webhook> {
        let route = Route::new(Method::GET, "/webhooks/{webhook_id}").param(webhook_id);
        self.call(ctx, Request::new(route)).await
    }

    pub async fn create_webhook(
        &self,
        ctx: &Context,
        channel_id: Snowflake,
        params: &CreateWebhook,
    ) -> Result<Webhook> {
        let route =
            Route::new(Method::POST, "/channels/{channel_id}/webhooks").param(channel_id);
        self.call(ctx, Request::new(route).json(params)?).await
    }

    pub async fn modify_webhook(
        &self,
        ctx: &Context,
        webhook_id: Snowflake,
        params: &ModifyWebhook,
    ) -> Result<Webhook> {
        let route = Route::new(Method::PATCH, "/webhooks/{webhook_id}").param(webhook_id);
        self.call(ctx, Request::new(route).json(params)?).await
    }

    pub async fn delete_webhook(&self, ctx: &Context, webhook_id: Snowflake) -> Result<()> {
        let route = Route::new(Method::DELETE, "/webhooks/{webhook_id}").param(webhook_id);
        self.call_unit(ctx, Request::new(route)).await
    }

    pub async fn create_channel_invite(
        &self,
        ctx: &Context,
        channel_id: Snowflake,
        params: &CreateInvite,
    ) -> Result<Invite> {
        let route =
            Route::new(Method::POST, "/channels/{channel_id}/invites").param(channel_id);
        self.call(ctx, Request::new(route).json(params)?).await
    }

    pub async fn get_invite(&self, ctx: &Context, code: &str) -> Result<Invite> {
        let route = Route::new(Method::GET, "/invites/{code}").param(invite_code(code)?);
        self.call(ctx, Request::new(route)).await
    }

    pub async fn delete_invite(&self, ctx: &Context, code: &str) -> Result<()> {
        let route = Route::new(Method::DELETE, "/invites/{code}").param(invite_code(code)?);
        self.call_unit(ctx, Request::new(route)).await
    }
}
