/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use syn::spanned::Spanned;

/// `#[handle_error(ExternalError)]` takes exactly one argument: a bare path
/// naming the external error type the wrapped function should return.
pub(crate) fn parse(arguments: &syn::AttributeArgs) -> syn::Result<syn::Path> {
    if arguments.len() != 1 {
        return Err(syn::Error::new(
            proc_macro2::Span::call_site(),
            "Expected #[handle_error(ExternalErrorType)] with exactly one argument",
        ));
    }
    match &arguments[0] {
        syn::NestedMeta::Meta(syn::Meta::Path(path)) => Ok(path.clone()),
        other => Err(syn::Error::new(
            other.span(),
            "Expected #[handle_error(ExternalErrorType)], where ExternalErrorType is a type name",
        )),
    }
}
