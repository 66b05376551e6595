use paperclip::actix::web;

use crate::handlers;

pub fn config_app(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(handlers::health)))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/user")
                        .service(
                            web::resource("/signUp").route(web::post().to(handlers::sign_up)),
                        )
                        .service(
                            web::resource("/signIn").route(web::post().to(handlers::sign_in)),
                        )
                        .service(
                            web::resource("/signOut").route(web::get().to(handlers::sign_out)),
                        ),
                )
                .service(
                    web::scope("/books")
                        .service(
                            web::resource("/create").route(web::post().to(handlers::create_book)),
                        )
                        .service(
                            web::resource("/all").route(web::get().to(handlers::get_all_books)),
                        )
                        .service(
                            web::resource("/searchs")
                                .route(web::get().to(handlers::search_books)),
                        )
                        .service(
                            web::resource("/update/{book_id}")
                                .route(web::put().to(handlers::update_book)),
                        )
                        .service(
                            web::resource("/delete/{book_id}")
                                .route(web::delete().to(handlers::delete_book)),
                        )
                        .service(
                            web::resource("/{book_id}").route(web::get().to(handlers::get_book)),
                        ),
                ),
        );
}
